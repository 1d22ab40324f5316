//! Frame to OpenCV `Mat` conversion.

use opencv::core::{Mat, Scalar, CV_8UC3};
use opencv::imgproc;
use opencv::prelude::{MatTrait, MatTraitConst};

use crate::error::{MediaError, MediaResult};
use crate::sampling::Frame;

pub(crate) fn cv_err(context: &'static str) -> impl Fn(opencv::Error) -> MediaError {
    move |e| MediaError::detection_failed(format!("{context}: {e}"))
}

/// Copy the frame's RGB buffer into a 3-channel `Mat`.
fn rgb_mat(frame: &Frame) -> MediaResult<Mat> {
    let mut rgb = Mat::new_rows_cols_with_default(
        frame.height() as i32,
        frame.width() as i32,
        CV_8UC3,
        Scalar::all(0.0),
    )
    .map_err(cv_err("alloc"))?;

    let bytes = rgb.data_bytes_mut().map_err(cv_err("mat bytes"))?;
    if bytes.len() != frame.image.as_raw().len() {
        return Err(MediaError::internal("Mat size does not match frame buffer"));
    }
    bytes.copy_from_slice(frame.image.as_raw());
    Ok(rgb)
}

pub(crate) fn frame_to_bgr(frame: &Frame) -> MediaResult<Mat> {
    let rgb = rgb_mat(frame)?;
    let mut bgr = Mat::default();
    imgproc::cvt_color_def(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR).map_err(cv_err("rgb2bgr"))?;
    Ok(bgr)
}

pub(crate) fn frame_to_gray(frame: &Frame) -> MediaResult<Mat> {
    let rgb = rgb_mat(frame)?;
    let mut gray = Mat::default();
    imgproc::cvt_color_def(&rgb, &mut gray, imgproc::COLOR_RGB2GRAY).map_err(cv_err("rgb2gray"))?;
    Ok(gray)
}
