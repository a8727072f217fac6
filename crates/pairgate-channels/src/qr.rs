//! QR payload rendering for browser clients.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use image::Luma;
use pairgate_core::error::PairgateError;
use qrcode::QrCode;
use std::io::Cursor;

/// Render QR payload data as PNG bytes.
pub fn generate_qr_image(data: &str) -> Result<Vec<u8>, PairgateError> {
    let code = QrCode::new(data.as_bytes())
        .map_err(|e| PairgateError::AdapterFailure(format!("QR encode failed: {e}")))?;
    let image = code.render::<Luma<u8>>().min_dimensions(256, 256).build();

    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| PairgateError::AdapterFailure(format!("PNG encode failed: {e}")))?;
    Ok(png)
}

/// Render QR payload data as a `data:image/png;base64,...` URL.
pub fn generate_qr_data_url(data: &str) -> Result<String, PairgateError> {
    let png = generate_qr_image(data)?;
    Ok(format!("data:image/png;base64,{}", BASE64.encode(png)))
}
