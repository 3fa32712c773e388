use std::{result, sync::Arc};

use log::{debug, error, info, trace};
use serde::Deserialize;
use warp::http;

use crate::auth::{AuthError, Login, SessionId, SignUp};
use crate::backend::{AddError, Backend, FindError};
use crate::gemini::{EditParams, GeminiClient, GenerateParams, GenerationError};
use crate::image::{DataUriError, GeneratedImage, InlineImage};
use crate::model::{AspectRatio, ImageSize, Model};
use crate::time::Timestamp;
use crate::user::User;

pub const MAX_IMAGES: u8 = 4;

pub struct Imager {
    backend: Backend,
    gemini: GeminiClient,
}

pub struct ImagerAuthed {
    imager: Arc<Imager>,
    session_id: SessionId,
    user: User,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub prompt: String,
    pub model: Model,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
    pub image_size: Option<ImageSize>,
    pub number_of_images: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditRequest {
    pub prompt: String,
    pub model: Model,
    /// `data:` uri of the image to edit
    pub image: String,
    pub aspect_ratio: Option<AspectRatio>,
    pub image_size: Option<ImageSize>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    Internal,
    Unauthorized,
    BadRequest(&'static str),
    Auth(AuthError),
    Generation(GenerationError),
}

pub type Result<T> = result::Result<T, Error>;

impl From<&Error> for http::StatusCode {
    fn from(e: &Error) -> Self {
        use GenerationError as G;

        match e {
            Error::Internal => Self::INTERNAL_SERVER_ERROR,
            Error::Unauthorized => Self::UNAUTHORIZED,
            Error::BadRequest(_) => Self::BAD_REQUEST,
            Error::Auth(AuthError::InvalidCredentials) => Self::UNAUTHORIZED,
            Error::Auth(_) => Self::BAD_REQUEST,
            Error::Generation(G::ApiKeyMissing) => Self::SERVICE_UNAVAILABLE,
            Error::Generation(G::ApiKeyInvalid | G::ApiKeyResetRequired) => Self::FORBIDDEN,
            Error::Generation(G::NoImages(_)) => Self::UNPROCESSABLE_ENTITY,
            Error::Generation(G::EditUnsupported(_) | G::SizeUnsupported(..)) => Self::BAD_REQUEST,
            Error::Generation(G::Failed(_)) => Self::BAD_GATEWAY,
        }
    }
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Internal => "INTERNAL",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Auth(e) => e.code(),
            Self::Generation(e) => e.code(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Internal => "An unexpected error occurred.".into(),
            Self::Unauthorized => "Please log in.".into(),
            Self::BadRequest(msg) => (*msg).into(),
            Self::Auth(e) => e.message().into(),
            Self::Generation(e) => e.to_string(),
        }
    }
}

impl warp::reject::Reject for Error {}

impl From<DataUriError> for Error {
    fn from(e: DataUriError) -> Self {
        Self::BadRequest(match e {
            DataUriError::NotDataUri => "The image must be sent as a data URI.",
            DataUriError::NotBase64 => "The image data must be base64 encoded.",
            DataUriError::NotImage => "The uploaded file is not an image.",
            DataUriError::Empty => "The uploaded image is empty.",
        })
    }
}

impl Imager {
    pub fn new(backend: Backend, gemini: GeminiClient) -> Self {
        Self { backend, gemini }
    }

    pub async fn signup(self: &Arc<Self>, form: SignUp) -> Result<ImagerAuthed> {
        form.validate().map_err(|e| {
            info!("rejecting signup for {}: {e:?}", form.email);
            Error::Auth(e)
        })?;

        let SignUp {
            username,
            email,
            password,
        } = form;

        let user = User {
            id: now()?.millis().to_string(),
            username,
            email,
            password_hash: password,
        };

        let email = user.email.clone();
        let user = self.backend.add_user(user).await.map_err(|e| match e {
            AddError::Exists => {
                info!("rejecting signup, {email} already exists");
                Error::Auth(AuthError::EmailTaken)
            }
            AddError::Internal => Error::Internal,
        })?;

        info!("{} signed up", user.email);
        self.start_session(user).await
    }

    pub async fn login(self: &Arc<Self>, form: Login) -> Result<ImagerAuthed> {
        let user = self
            .backend
            .find_user(&form.email, &form.password)
            .await
            .map_err(|e| match e {
                FindError::NotFound => {
                    error!("invalid email or password for {}", form.email);
                    Error::Auth(AuthError::InvalidCredentials)
                }
                FindError::Internal => Error::Internal,
            })?;

        info!("{} login", user.email);
        self.start_session(user).await
    }

    async fn start_session(self: &Arc<Self>, user: User) -> Result<ImagerAuthed> {
        let session_id = SessionId::new();

        self.backend
            .set_current_user(&session_id, &user)
            .await
            .map_err(|()| Error::Internal)?;

        debug!("{} has session {session_id}", user.email);
        Ok(ImagerAuthed {
            imager: Arc::clone(self),
            session_id,
            user,
        })
    }

    pub async fn authenticate(self: &Arc<Self>, session_id: SessionId) -> Result<ImagerAuthed> {
        let user = self
            .backend
            .current_user(&session_id)
            .await
            .map_err(|()| Error::Internal)?;

        match user {
            Some(user) => {
                trace!("found {} by session", user.email);
                Ok(ImagerAuthed {
                    imager: Arc::clone(self),
                    session_id,
                    user,
                })
            }
            None => {
                error!("no user for session {session_id}");
                Err(Error::Unauthorized)
            }
        }
    }
}

impl ImagerAuthed {
    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub async fn logout(&self) -> Result<()> {
        info!("{} logout", self.user.email);

        if !self.imager.backend.clear_current_user(&self.session_id).await {
            debug!("session {} was already logged out", self.session_id);
        }
        Ok(())
    }

    pub async fn generate(&self, req: GenerateRequest) -> Result<Vec<GeneratedImage>> {
        let prompt = checked_prompt(req.prompt)?;

        let number_of_images = req.number_of_images.unwrap_or(MAX_IMAGES);
        if !(1..=MAX_IMAGES).contains(&number_of_images) {
            return Err(Error::BadRequest("numberOfImages must be between 1 and 4."));
        }

        let params = GenerateParams {
            prompt,
            model: req.model,
            aspect_ratio: req.aspect_ratio,
            image_size: req.image_size,
            number_of_images,
        };

        info!(
            "{} generating with {}, {}, {} images",
            self.user.email,
            params.model,
            params.aspect_ratio.as_str(),
            number_of_images,
        );

        let images = self
            .imager
            .gemini
            .generate(&params)
            .await
            .map_err(|e| generation_failed(&self.user.email, e))?;

        Ok(GeneratedImage::collect(images, &params.prompt, params.model, now()?))
    }

    pub async fn edit(&self, req: EditRequest) -> Result<Vec<GeneratedImage>> {
        let prompt = checked_prompt(req.prompt)?;
        let image = InlineImage::parse_data_uri(&req.image)?;

        let params = EditParams {
            prompt,
            model: req.model,
            image,
            aspect_ratio: req.aspect_ratio,
            image_size: req.image_size,
        };

        info!(
            "{} editing a {} image with {}",
            self.user.email, params.image.mime_type, params.model,
        );

        let images = self
            .imager
            .gemini
            .edit(&params)
            .await
            .map_err(|e| generation_failed(&self.user.email, e))?;

        Ok(GeneratedImage::collect(images, &params.prompt, params.model, now()?))
    }
}

fn generation_failed(email: &str, e: GenerationError) -> Error {
    match e {
        GenerationError::Failed(ref detail) => error!("{email}: provider call failed: {detail}"),
        ref e => error!("{email}: {} ({e})", e.code()),
    }
    Error::Generation(e)
}

fn checked_prompt(prompt: String) -> Result<String> {
    if prompt.trim().is_empty() {
        return Err(Error::BadRequest("Please enter a prompt."));
    }
    Ok(prompt)
}

fn now() -> Result<Timestamp> {
    Timestamp::now().map_err(|()| Error::Internal)
}
