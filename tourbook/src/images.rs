//! Upload processing: decode, crop to size and re-encode as JPEG.
//!
//! Decoding and resizing are CPU bound and run on the blocking thread pool.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use chrono::Utc;
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType};
use tracing::instrument;

use crate::{
    errors::Error,
    types::{TourId, UserId},
};

const JPEG_QUALITY: u8 = 90;

/// Target size of user photos
pub const USER_PHOTO_SIZE: (u32, u32) = (500, 500);
/// Target size of tour cover and gallery images
pub const TOUR_IMAGE_SIZE: (u32, u32) = (2000, 1333);

const NOT_AN_IMAGE: &str = "Not an image! Please upload only images.";

/// Reject uploads that do not declare an image content type.
pub fn ensure_image(content_type: Option<&str>) -> Result<(), Error> {
    match content_type {
        Some(ct) if ct.starts_with("image/") => Ok(()),
        _ => Err(Error::BadRequest {
            message: NOT_AN_IMAGE.to_string(),
        }),
    }
}

/// Crop and scale to exactly `size`, then encode as JPEG.
pub fn resize_to_jpeg(bytes: &[u8], size: (u32, u32)) -> Result<Vec<u8>, Error> {
    let decoded = image::load_from_memory(bytes).map_err(|_| Error::BadRequest {
        message: NOT_AN_IMAGE.to_string(),
    })?;
    let resized = decoded.resize_to_fill(size.0, size.1, FilterType::Lanczos3).to_rgb8();

    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode_image(&resized)
        .map_err(|e| Error::Internal {
            operation: format!("encode jpeg: {e}"),
        })?;
    Ok(out.into_inner())
}

async fn process_and_store(bytes: Vec<u8>, size: (u32, u32), dir: PathBuf, filename: String) -> Result<String, Error> {
    let jpeg = tokio::task::spawn_blocking(move || resize_to_jpeg(&bytes, size))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn image resize task: {e}"),
        })??;

    tokio::fs::create_dir_all(&dir).await.map_err(|e| Error::Internal {
        operation: format!("create image directory: {e}"),
    })?;
    tokio::fs::write(dir.join(&filename), jpeg).await.map_err(|e| Error::Internal {
        operation: format!("write image {filename}: {e}"),
    })?;
    Ok(filename)
}

/// Store a user photo as `img/users/user-{id}-{ts}.jpeg`, returning the file name.
#[instrument(skip(public_dir, bytes), fields(size = bytes.len()), err)]
pub async fn save_user_photo(public_dir: &Path, user_id: UserId, bytes: Vec<u8>) -> Result<String, Error> {
    let filename = format!("user-{}-{}.jpeg", user_id, Utc::now().timestamp_millis());
    process_and_store(bytes, USER_PHOTO_SIZE, public_dir.join("img").join("users"), filename).await
}

/// Store a tour cover (`index` None) or gallery image under `img/tours`, returning the file name.
#[instrument(skip(public_dir, bytes), fields(size = bytes.len()), err)]
pub async fn save_tour_image(public_dir: &Path, tour_id: TourId, index: Option<usize>, bytes: Vec<u8>) -> Result<String, Error> {
    let suffix = match index {
        Some(i) => (i + 1).to_string(),
        None => "cover".to_string(),
    };
    let filename = format!("tour-{}-{}-{}.jpeg", tour_id, Utc::now().timestamp_millis(), suffix);
    process_and_store(bytes, TOUR_IMAGE_SIZE, public_dir.join("img").join("tours"), filename).await
}
