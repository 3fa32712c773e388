use base64_light::base64_decode;
use serde::{Deserialize, Serialize};

use crate::model::Model;
use crate::time::Timestamp;

const FILENAME_PROMPT_UNITS: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GeneratedImage {
    pub id: String,
    /// `data:` uri
    pub src: String,
    pub prompt: String,
    pub model: Model,
}

/// Base64 image data as carried in a `data:` uri or a provider response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataUriError {
    NotDataUri,
    NotBase64,
    NotImage,
    Empty,
}

impl InlineImage {
    pub fn png(data: String) -> Self {
        Self {
            mime_type: "image/png".into(),
            data,
        }
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    pub fn parse_data_uri(uri: &str) -> Result<Self, DataUriError> {
        let rest = uri.strip_prefix("data:").ok_or(DataUriError::NotDataUri)?;
        let (meta, data) = rest.split_once(',').ok_or(DataUriError::NotDataUri)?;
        let mime_type = meta.strip_suffix(";base64").ok_or(DataUriError::NotBase64)?;

        if !mime_type.starts_with("image/") {
            return Err(DataUriError::NotImage);
        }
        if data.is_empty() {
            return Err(DataUriError::Empty);
        }
        if !is_padded_base64(data) {
            return Err(DataUriError::NotBase64);
        }

        Ok(Self {
            mime_type: mime_type.into(),
            data: data.into(),
        })
    }

    pub fn bytes(&self) -> Vec<u8> {
        base64_decode(&self.data)
    }
}

// whole 4 character groups, `=` only as the last one or two characters
fn is_padded_base64(data: &str) -> bool {
    if data.len() % 4 != 0 {
        return false;
    }

    let body = data.trim_end_matches('=');
    data.len() - body.len() <= 2
        && body
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/'))
}

impl GeneratedImage {
    /// Ids are `<millis>-<index>`, shared by every image of one response.
    pub fn collect(
        images: impl IntoIterator<Item = InlineImage>,
        prompt: &str,
        model: Model,
        now: Timestamp,
    ) -> Vec<Self> {
        images
            .into_iter()
            .enumerate()
            .map(|(index, image)| Self {
                id: format!("{}-{index}", now.millis()),
                src: image.to_data_uri(),
                prompt: prompt.into(),
                model,
            })
            .collect()
    }
}

/// `ai-imager-<prompt>.png`, with the prompt cut to its first 30 UTF-16
/// units and each unit outside `[a-z0-9]` replaced, so a character outside
/// the basic plane becomes `__`.
pub fn download_filename(prompt: &str) -> String {
    let mut safe = String::new();
    let mut units = 0;

    for c in prompt.chars() {
        if units == FILENAME_PROMPT_UNITS {
            break;
        }

        if c.is_ascii_alphanumeric() {
            safe.push(c.to_ascii_lowercase());
            units += 1;
        } else {
            // a surrogate pair cut at the limit leaves one unit
            let n = c.len_utf16().min(FILENAME_PROMPT_UNITS - units);
            safe.extend(std::iter::repeat('_').take(n));
            units += n;
        }
    }

    format!("ai-imager-{safe}.png")
}
