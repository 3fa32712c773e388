use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum Model {
    #[serde(rename = "gemini-2.5-flash-image")]
    GeminiFlashImage,
    #[serde(rename = "gemini-3-pro-image-preview")]
    GeminiProImage,
    #[serde(rename = "imagen-4.0-generate-001")]
    Imagen4,
}

/// How a model is called on the provider side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// `models/{id}:generateContent`, images come back as inline data parts
    GenerateContent,
    /// `models/{id}:predict`, images come back as base64 predictions
    Predict,
}

impl Model {
    pub const ALL: [Model; 3] = [Model::GeminiFlashImage, Model::GeminiProImage, Model::Imagen4];

    pub fn id(&self) -> &'static str {
        match self {
            Self::GeminiFlashImage => "gemini-2.5-flash-image",
            Self::GeminiProImage => "gemini-3-pro-image-preview",
            Self::Imagen4 => "imagen-4.0-generate-001",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::GeminiFlashImage => "Gemini Flash Image (Fast)",
            Self::GeminiProImage => "Gemini Pro Image (High Quality)",
            Self::Imagen4 => "Imagen 4",
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        match self {
            Self::GeminiFlashImage | Self::GeminiProImage => Endpoint::GenerateContent,
            Self::Imagen4 => Endpoint::Predict,
        }
    }

    /// Output sizes the model accepts. Empty when it has no size option.
    pub fn image_sizes(&self) -> &'static [ImageSize] {
        match self {
            Self::GeminiFlashImage => &[],
            Self::GeminiProImage => &ImageSize::ALL,
            Self::Imagen4 => &[ImageSize::OneK, ImageSize::TwoK],
        }
    }

    pub fn supports_edit(&self) -> bool {
        self.endpoint() == Endpoint::GenerateContent
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "4:3")]
    Standard,
    #[serde(rename = "3:4")]
    StandardPortrait,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Square,
        AspectRatio::Landscape,
        AspectRatio::Portrait,
        AspectRatio::Standard,
        AspectRatio::StandardPortrait,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Square => "1:1",
            Self::Landscape => "16:9",
            Self::Portrait => "9:16",
            Self::Standard => "4:3",
            Self::StandardPortrait => "3:4",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ImageSize {
    #[serde(rename = "1K")]
    OneK,
    #[serde(rename = "2K")]
    TwoK,
    #[serde(rename = "4K")]
    FourK,
}

impl ImageSize {
    pub const ALL: [ImageSize; 3] = [ImageSize::OneK, ImageSize::TwoK, ImageSize::FourK];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneK => "1K",
            Self::TwoK => "2K",
            Self::FourK => "4K",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::OneK => "1K (Standard)",
            Self::TwoK => "2K (HD)",
            Self::FourK => "4K (Ultra HD)",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Choice {
    value: &'static str,
    label: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    models: Vec<ModelChoice>,
    aspect_ratios: Vec<Choice>,
    image_sizes: Vec<Choice>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelChoice {
    id: &'static str,
    name: &'static str,
    supports_edit: bool,
    image_sizes: Vec<&'static str>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            models: Model::ALL
                .iter()
                .map(|m| ModelChoice {
                    id: m.id(),
                    name: m.name(),
                    supports_edit: m.supports_edit(),
                    image_sizes: m.image_sizes().iter().map(ImageSize::as_str).collect(),
                })
                .collect(),
            aspect_ratios: AspectRatio::ALL
                .iter()
                .map(|r| Choice {
                    value: r.as_str(),
                    label: r.as_str(),
                })
                .collect(),
            image_sizes: ImageSize::ALL
                .iter()
                .map(|s| Choice {
                    value: s.as_str(),
                    label: s.label(),
                })
                .collect(),
        }
    }
}
