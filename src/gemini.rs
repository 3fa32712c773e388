//! Image generation and editing against the Gemini API.
//!
//! Gemini image models are called through `generateContent` and answer with
//! inline data parts. Imagen is called through `predict` and answers with
//! base64 predictions. Each call is a single request, nothing is retried.

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::image::InlineImage;
use crate::model::{AspectRatio, Endpoint, ImageSize, Model};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const INVALID_KEY: &str = "API key not valid";
const KEY_NOT_FOUND: &str = "Requested entity was not found";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("API key not found. Please ensure it is configured correctly.")]
    ApiKeyMissing,

    #[error("The provided API key is invalid. Please check your configuration.")]
    ApiKeyInvalid,

    #[error("The selected API key is no longer available. Please select a new API key.")]
    ApiKeyResetRequired,

    #[error("The model did not return any images.{}", note(.0))]
    NoImages(Option<String>),

    #[error("Model \"{}\" does not support image editing.", .0.name())]
    EditUnsupported(Model),

    #[error("Model \"{}\" does not support the {} image size.", .0.name(), .1.as_str())]
    SizeUnsupported(Model, ImageSize),

    #[error("Failed to generate images. The AI service may be busy or unavailable.")]
    Failed(String),
}

fn note(reason: &Option<String>) -> String {
    reason.as_deref().map(|r| format!(" {r}")).unwrap_or_default()
}

impl GenerationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ApiKeyMissing => "API_KEY_MISSING",
            Self::ApiKeyInvalid => "API_KEY_INVALID",
            Self::ApiKeyResetRequired => "API_KEY_RESET_REQUIRED",
            Self::NoImages(_) => "NO_IMAGES",
            Self::EditUnsupported(_) => "EDIT_UNSUPPORTED",
            Self::SizeUnsupported(..) => "SIZE_UNSUPPORTED",
            Self::Failed(_) => "GENERATION_FAILED",
        }
    }

    /// Sorts a provider error message into one of the known failures.
    pub fn from_provider_message(message: &str) -> Self {
        if message.contains(INVALID_KEY) {
            Self::ApiKeyInvalid
        } else if message.contains(KEY_NOT_FOUND) {
            Self::ApiKeyResetRequired
        } else {
            Self::Failed(message.into())
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerateParams {
    pub prompt: String,
    pub model: Model,
    pub aspect_ratio: AspectRatio,
    pub image_size: Option<ImageSize>,
    pub number_of_images: u8,
}

#[derive(Debug, Clone)]
pub struct EditParams {
    pub prompt: String,
    pub model: Model,
    pub image: InlineImage,
    pub aspect_ratio: Option<AspectRatio>,
    pub image_size: Option<ImageSize>,
}

/// A request shaped for the endpoint its model is served from.
#[derive(Debug, PartialEq)]
pub enum ProviderRequest {
    GenerateContent(Model, GenerateContentRequest),
    Predict(Model, PredictRequest),
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_config: Option<ImageConfig>,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    aspect_ratio: Option<AspectRatio>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_size: Option<ImageSize>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct PredictRequest {
    instances: Vec<PredictInstance>,
    parameters: PredictParameters,
}

#[derive(Debug, PartialEq, Serialize)]
struct PredictInstance {
    prompt: String,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictParameters {
    sample_count: u8,
    aspect_ratio: AspectRatio,
    output_mime_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sample_image_size: Option<ImageSize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
    mime_type: Option<String>,
    rai_filtered_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl ProviderRequest {
    pub fn generate(params: &GenerateParams) -> Result<Self, GenerationError> {
        let GenerateParams {
            ref prompt,
            model,
            aspect_ratio,
            image_size,
            number_of_images,
        } = *params;

        match model.endpoint() {
            Endpoint::Predict => {
                let sample_image_size = match image_size {
                    Some(size) if !model.image_sizes().contains(&size) => {
                        return Err(GenerationError::SizeUnsupported(model, size))
                    }
                    size => size,
                };

                Ok(Self::Predict(
                    model,
                    PredictRequest {
                        instances: vec![PredictInstance {
                            prompt: prompt.clone(),
                        }],
                        parameters: PredictParameters {
                            sample_count: number_of_images,
                            aspect_ratio,
                            output_mime_type: "image/png",
                            sample_image_size,
                        },
                    },
                ))
            }
            Endpoint::GenerateContent => {
                let parts = vec![Part {
                    text: Some(prompt.clone()),
                    inline_data: None,
                }];

                Ok(Self::GenerateContent(
                    model,
                    GenerateContentRequest::new(
                        parts,
                        Some(aspect_ratio),
                        sized_or_warn(model, image_size),
                    ),
                ))
            }
        }
    }

    pub fn edit(params: &EditParams) -> Result<Self, GenerationError> {
        let EditParams {
            ref prompt,
            model,
            ref image,
            aspect_ratio,
            image_size,
        } = *params;

        if model.endpoint() != Endpoint::GenerateContent {
            return Err(GenerationError::EditUnsupported(model));
        }

        // the image goes first, the instruction refers to it
        let parts = vec![
            Part {
                text: None,
                inline_data: Some(InlineData {
                    mime_type: image.mime_type.clone(),
                    data: image.data.clone(),
                }),
            },
            Part {
                text: Some(prompt.clone()),
                inline_data: None,
            },
        ];

        Ok(Self::GenerateContent(
            model,
            GenerateContentRequest::new(parts, aspect_ratio, sized_or_warn(model, image_size)),
        ))
    }

    fn url(&self, base_url: &str) -> String {
        let (model, method) = match self {
            Self::GenerateContent(model, _) => (model, "generateContent"),
            Self::Predict(model, _) => (model, "predict"),
        };
        format!("{}/models/{}:{}", base_url.trim_end_matches('/'), model.id(), method)
    }
}

// generateContent models without a size option drop it rather than fail
fn sized_or_warn(model: Model, size: Option<ImageSize>) -> Option<ImageSize> {
    match size {
        Some(size) if model.image_sizes().is_empty() => {
            warn!("{model} has no image size option, ignoring {}", size.as_str());
            None
        }
        size => size,
    }
}

impl GenerateContentRequest {
    fn new(parts: Vec<Part>, aspect_ratio: Option<AspectRatio>, image_size: Option<ImageSize>) -> Self {
        let image_config = (aspect_ratio.is_some() || image_size.is_some()).then_some(ImageConfig {
            aspect_ratio,
            image_size,
        });

        Self {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                response_modalities: vec!["IMAGE"],
                image_config,
            },
        }
    }
}

fn images_from_content(resp: GenerateContentResponse) -> Result<Vec<InlineImage>, GenerationError> {
    let mut images = vec![];
    let mut notes = vec![];

    if let Some(reason) = resp.prompt_feedback.and_then(|f| f.block_reason) {
        notes.push(format!("Prompt blocked: {reason}."));
    }

    for candidate in resp.candidates {
        let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
        let mut had_image = false;

        for part in parts {
            if let Some(InlineData { mime_type, data }) = part.inline_data {
                had_image = true;
                images.push(InlineImage { mime_type, data });
            } else if let Some(text) = part.text {
                debug!("model text: {text}");
                notes.push(text);
            }
        }

        match candidate.finish_reason.as_deref() {
            Some("STOP") | None => {}
            Some(reason) if !had_image => notes.push(format!("Finished with {reason}.")),
            Some(_) => {}
        }
    }

    if images.is_empty() {
        let note = (!notes.is_empty()).then(|| notes.join(" "));
        return Err(GenerationError::NoImages(note));
    }

    Ok(images)
}

fn images_from_predictions(resp: PredictResponse) -> Result<Vec<InlineImage>, GenerationError> {
    let mut filtered = None;

    let images: Vec<_> = resp
        .predictions
        .into_iter()
        .filter_map(|p| match p.bytes_base64_encoded {
            Some(data) => Some(match p.mime_type {
                Some(mime_type) => InlineImage { mime_type, data },
                None => InlineImage::png(data),
            }),
            None => {
                filtered = p.rai_filtered_reason.or(filtered.take());
                None
            }
        })
        .collect();

    if images.is_empty() {
        return Err(GenerationError::NoImages(filtered));
    }

    Ok(images)
}

pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        }
    }

    pub async fn generate(&self, params: &GenerateParams) -> Result<Vec<InlineImage>, GenerationError> {
        let api_key = self.api_key()?;
        let request = ProviderRequest::generate(params)?;
        self.send(api_key, request).await
    }

    pub async fn edit(&self, params: &EditParams) -> Result<Vec<InlineImage>, GenerationError> {
        let api_key = self.api_key()?;
        let request = ProviderRequest::edit(params)?;
        self.send(api_key, request).await
    }

    fn api_key(&self) -> Result<&str, GenerationError> {
        self.api_key.as_deref().ok_or_else(|| {
            error!("no API key configured");
            GenerationError::ApiKeyMissing
        })
    }

    async fn send(&self, api_key: &str, request: ProviderRequest) -> Result<Vec<InlineImage>, GenerationError> {
        let url = request.url(&self.base_url);
        info!("POST {url}");

        let builder = self.http.post(&url).header("x-goog-api-key", api_key);
        let builder = match request {
            ProviderRequest::GenerateContent(_, ref body) => builder.json(body),
            ProviderRequest::Predict(_, ref body) => builder.json(body),
        };

        let resp = builder.send().await.map_err(|e| {
            error!("couldn't reach {url}: {e:?}");
            GenerationError::Failed(e.to_string())
        })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| {
            error!("couldn't read response from {url}: {e:?}");
            GenerationError::Failed(e.to_string())
        })?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            error!("{url} failed with {status}: {message}");
            return Err(GenerationError::from_provider_message(&message));
        }

        let parse_err = |e: serde_json::Error| {
            error!("couldn't parse response from {url}: {e:?}");
            GenerationError::Failed(e.to_string())
        };

        let images = match request {
            ProviderRequest::GenerateContent(..) => {
                images_from_content(serde_json::from_str(&body).map_err(parse_err)?)
            }
            ProviderRequest::Predict(..) => {
                images_from_predictions(serde_json::from_str(&body).map_err(parse_err)?)
            }
        }?;

        info!("{url}: {} images", images.len());
        Ok(images)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn generate(model: Model) -> GenerateParams {
        GenerateParams {
            prompt: "a lighthouse at dusk".into(),
            model,
            aspect_ratio: AspectRatio::Landscape,
            image_size: Some(ImageSize::TwoK),
            number_of_images: 4,
        }
    }

    fn edit(model: Model) -> EditParams {
        EditParams {
            prompt: "make it snow".into(),
            model,
            image: InlineImage {
                mime_type: "image/jpeg".into(),
                data: "/9j/4AAQ".into(),
            },
            aspect_ratio: None,
            image_size: None,
        }
    }

    fn body(req: &ProviderRequest) -> serde_json::Value {
        match req {
            ProviderRequest::GenerateContent(_, b) => serde_json::to_value(b).unwrap(),
            ProviderRequest::Predict(_, b) => serde_json::to_value(b).unwrap(),
        }
    }

    #[test]
    fn imagen_uses_predict() {
        let req = ProviderRequest::generate(&generate(Model::Imagen4)).unwrap();

        assert!(matches!(req, ProviderRequest::Predict(Model::Imagen4, _)));
        assert_eq!(
            req.url("https://host/v1beta/"),
            "https://host/v1beta/models/imagen-4.0-generate-001:predict"
        );
        assert_eq!(
            body(&req),
            json!({
                "instances": [{ "prompt": "a lighthouse at dusk" }],
                "parameters": {
                    "sampleCount": 4,
                    "aspectRatio": "16:9",
                    "outputMimeType": "image/png",
                    "sampleImageSize": "2K",
                }
            })
        );
    }

    #[test]
    fn imagen_rejects_4k() {
        let mut params = generate(Model::Imagen4);
        params.image_size = Some(ImageSize::FourK);

        assert_eq!(
            ProviderRequest::generate(&params),
            Err(GenerationError::SizeUnsupported(Model::Imagen4, ImageSize::FourK))
        );
    }

    #[test]
    fn listed_sizes_are_accepted() {
        for model in Model::ALL {
            for &size in model.image_sizes() {
                let mut params = generate(model);
                params.image_size = Some(size);
                assert!(ProviderRequest::generate(&params).is_ok(), "{model} {}", size.as_str());
            }
        }
    }

    #[test]
    fn flash_uses_generate_content_without_size() {
        let req = ProviderRequest::generate(&generate(Model::GeminiFlashImage)).unwrap();

        assert!(matches!(req, ProviderRequest::GenerateContent(Model::GeminiFlashImage, _)));
        assert_eq!(
            req.url("https://host/v1beta"),
            "https://host/v1beta/models/gemini-2.5-flash-image:generateContent"
        );
        assert_eq!(
            body(&req),
            json!({
                "contents": [{ "parts": [{ "text": "a lighthouse at dusk" }] }],
                "generationConfig": {
                    "responseModalities": ["IMAGE"],
                    "imageConfig": { "aspectRatio": "16:9" },
                }
            })
        );
    }

    #[test]
    fn pro_sends_image_size() {
        let req = ProviderRequest::generate(&generate(Model::GeminiProImage)).unwrap();

        assert!(matches!(req, ProviderRequest::GenerateContent(Model::GeminiProImage, _)));
        assert_eq!(
            body(&req)["generationConfig"]["imageConfig"],
            json!({ "aspectRatio": "16:9", "imageSize": "2K" })
        );
    }

    #[test]
    fn edit_sends_image_before_prompt() {
        let req = ProviderRequest::edit(&edit(Model::GeminiFlashImage)).unwrap();

        assert_eq!(
            body(&req),
            json!({
                "contents": [{ "parts": [
                    { "inlineData": { "mimeType": "image/jpeg", "data": "/9j/4AAQ" } },
                    { "text": "make it snow" },
                ] }],
                "generationConfig": { "responseModalities": ["IMAGE"] }
            })
        );
    }

    #[test]
    fn imagen_cannot_edit() {
        assert_eq!(
            ProviderRequest::edit(&edit(Model::Imagen4)),
            Err(GenerationError::EditUnsupported(Model::Imagen4))
        );
    }

    #[test]
    fn provider_messages() {
        assert_eq!(
            GenerationError::from_provider_message(
                "API key not valid. Please pass a valid API key."
            ),
            GenerationError::ApiKeyInvalid
        );
        assert_eq!(
            GenerationError::from_provider_message("Requested entity was not found."),
            GenerationError::ApiKeyResetRequired
        );
        assert_eq!(
            GenerationError::from_provider_message("The model is overloaded.").code(),
            "GENERATION_FAILED"
        );
    }

    #[test]
    fn no_images_message() {
        assert_eq!(
            GenerationError::NoImages(None).to_string(),
            "The model did not return any images."
        );
        assert_eq!(
            GenerationError::NoImages(Some("Prompt blocked: SAFETY.".into())).to_string(),
            "The model did not return any images. Prompt blocked: SAFETY."
        );
    }

    #[test]
    fn content_parts_parsed() {
        let resp: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "text": "Here is your image" },
                        { "inlineData": { "mimeType": "image/png", "data": "iVBORw0K" } },
                    ]
                },
                "finishReason": "STOP"
            }]
        }))
        .unwrap();

        assert_eq!(
            images_from_content(resp),
            Ok(vec![InlineImage::png("iVBORw0K".into())])
        );
    }

    #[test]
    fn content_without_images() {
        let resp: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [],
            "promptFeedback": { "blockReason": "SAFETY" }
        }))
        .unwrap();

        assert_eq!(
            images_from_content(resp),
            Err(GenerationError::NoImages(Some("Prompt blocked: SAFETY.".into())))
        );

        let resp: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "finishReason": "IMAGE_SAFETY" }]
        }))
        .unwrap();

        assert_eq!(
            images_from_content(resp),
            Err(GenerationError::NoImages(Some("Finished with IMAGE_SAFETY.".into())))
        );
    }

    #[test]
    fn predictions_parsed() {
        let resp: PredictResponse = serde_json::from_value(json!({
            "predictions": [
                { "bytesBase64Encoded": "AAAA", "mimeType": "image/png" },
                { "raiFilteredReason": "filtered" },
                { "bytesBase64Encoded": "BBBB" },
            ]
        }))
        .unwrap();

        assert_eq!(
            images_from_predictions(resp),
            Ok(vec![
                InlineImage::png("AAAA".into()),
                InlineImage::png("BBBB".into())
            ])
        );

        let resp: PredictResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(
            images_from_predictions(resp),
            Err(GenerationError::NoImages(None))
        );
    }

    #[tokio::test]
    async fn missing_key_makes_no_request() {
        let server = MockServer::start().await;
        let client = GeminiClient::new(server.uri(), Some("  ".into()));

        let err = client.generate(&generate(Model::Imagen4)).await.unwrap_err();

        assert_eq!(err, GenerationError::ApiKeyMissing);
        assert_eq!(err.code(), "API_KEY_MISSING");
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn imagen_round_trip() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/models/imagen-4.0-generate-001:predict"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_json(body(
                &ProviderRequest::generate(&generate(Model::Imagen4)).unwrap(),
            )))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "predictions": [
                    { "bytesBase64Encoded": "AAAA", "mimeType": "image/png" },
                    { "bytesBase64Encoded": "BBBB", "mimeType": "image/png" },
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::new(server.uri(), Some("test-key".into()));
        let images = client.generate(&generate(Model::Imagen4)).await.unwrap();

        assert_eq!(images.len(), 2);
        assert_eq!(images[1].data, "BBBB");
    }

    #[tokio::test]
    async fn gemini_edit_round_trip() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash-image:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": { "parts": [
                        { "inlineData": { "mimeType": "image/png", "data": "CCCC" } }
                    ] },
                    "finishReason": "STOP"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::new(server.uri(), Some("test-key".into()));
        let images = client.edit(&edit(Model::GeminiFlashImage)).await.unwrap();

        assert_eq!(images, vec![InlineImage::png("CCCC".into())]);
    }

    #[tokio::test]
    async fn provider_errors_mapped() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash-image:generateContent"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "code": 400,
                    "message": "API key not valid. Please pass a valid API key.",
                    "status": "INVALID_ARGUMENT"
                }
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/models/gemini-3-pro-image-preview:generateContent"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {
                    "code": 404,
                    "message": "Requested entity was not found.",
                    "status": "NOT_FOUND"
                }
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/models/imagen-4.0-generate-001:predict"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream busy"))
            .mount(&server)
            .await;

        let client = GeminiClient::new(server.uri(), Some("test-key".into()));

        assert_eq!(
            client.generate(&generate(Model::GeminiFlashImage)).await,
            Err(GenerationError::ApiKeyInvalid)
        );
        assert_eq!(
            client.generate(&generate(Model::GeminiProImage)).await,
            Err(GenerationError::ApiKeyResetRequired)
        );
        assert_eq!(
            client.generate(&generate(Model::Imagen4)).await,
            Err(GenerationError::Failed("upstream busy".into()))
        );
    }
}
