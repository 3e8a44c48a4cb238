use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct PhotoUploadResponse {
    pub path: String,
    pub url: Option<String>,
}

/// POST /photos/base64 body. `image_b64` may be a bare base64 string or a
/// `data:` URL.
#[derive(Debug, Deserialize)]
pub struct PhotoBase64Request {
    pub image_b64: String,
}

#[derive(Debug, Deserialize)]
pub struct SignedUrlQuery {
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct SignedUrlResponse {
    pub path: String,
    pub url: Option<String>,
}
