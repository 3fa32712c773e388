use std::convert::Infallible;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use cookie::{Cookie, SameSite};
use log::{error, info, warn};
use serde::{de::DeserializeOwned, Serialize};
use warp::http::{header, Response, StatusCode};
use warp::{Filter, Rejection, Reply};

mod args;
use args::Args;

mod auth;
use auth::{Login, SessionId, SignUp};

mod backend;
use backend::Backend;

mod gemini;
use gemini::GeminiClient;

mod image;
use image::{download_filename, GeneratedImage, InlineImage};

mod imager;
use imager::{EditRequest, Error, GenerateRequest, Imager, ImagerAuthed};

mod model;
use model::Catalog;

mod time;
mod user;

const SESSION_COOKIE: &str = "sessionid";
const MAX_BODY_BYTES: u64 = 20 * 1024 * 1024;

#[tokio::main]
async fn main() -> ExitCode {
    pretty_env_logger::init();

    let args = Args::parse();

    let addr = match args.addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!("couldn't parse address: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = backend::init(args.data_dir()).await {
        error!("couldn't create data directory {:?}: {e}", args.data_dir());
        return ExitCode::FAILURE;
    }
    let backend = Backend::new(args.data_dir()).await;

    let api_key = args.api_key();
    if api_key.is_none() {
        warn!("no API key configured, image requests will fail");
    }
    let gemini = GeminiClient::new(args.api_base_url(), api_key);

    let imager = Arc::new(Imager::new(backend, gemini));

    info!("listening on {addr}");
    warp::serve(routes(imager, args.secure())).run(addr).await;

    ExitCode::SUCCESS
}

fn routes(
    imager: Arc<Imager>,
    secure: bool,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let imager = warp::any().map(move || Arc::clone(&imager));
    let secure = warp::any().map(move || secure);

    let authed = warp::cookie::optional::<String>(SESSION_COOKIE)
        .and(imager.clone())
        .and_then(authenticate);

    let catalog = warp::path!("api" / "catalog")
        .and(warp::get())
        .map(|| warp::reply::json(&Catalog::new()));

    let auth = {
        let signup = warp::path!("api" / "auth" / "signup")
            .and(warp::post())
            .and(json_body())
            .and(imager.clone())
            .and(secure.clone())
            .and_then(|form: SignUp, imager: Arc<Imager>, secure| async move {
                let authed = imager.signup(form).await.map_err(warp::reject::custom)?;
                Ok::<_, Rejection>(with_session(&authed, secure))
            });

        let login = warp::path!("api" / "auth" / "login")
            .and(warp::post())
            .and(json_body())
            .and(imager.clone())
            .and(secure.clone())
            .and_then(|form: Login, imager: Arc<Imager>, secure| async move {
                let authed = imager.login(form).await.map_err(warp::reject::custom)?;
                Ok::<_, Rejection>(with_session(&authed, secure))
            });

        let logout = warp::path!("api" / "auth" / "logout")
            .and(warp::post())
            .and(authed.clone())
            .and(secure.clone())
            .and_then(|authed: ImagerAuthed, secure| async move {
                authed.logout().await.map_err(warp::reject::custom)?;
                Ok::<_, Rejection>(warp::reply::with_header(
                    warp::reply(),
                    header::SET_COOKIE,
                    session_cookie(String::new(), secure)
                        .max_age(::time::Duration::ZERO)
                        .build()
                        .to_string(),
                ))
            });

        let me = warp::path!("api" / "auth" / "me")
            .and(warp::get())
            .and(authed.clone())
            .map(|authed: ImagerAuthed| warp::reply::json(&authed.user().view()));

        signup.or(login).or(logout).or(me)
    };

    let images = {
        let generate = warp::path!("api" / "images" / "generate")
            .and(warp::post())
            .and(authed.clone())
            .and(json_body())
            .and_then(|authed: ImagerAuthed, req: GenerateRequest| async move {
                let images = authed.generate(req).await.map_err(warp::reject::custom)?;
                Ok::<_, Rejection>(warp::reply::json(&images))
            });

        let edit = warp::path!("api" / "images" / "edit")
            .and(warp::post())
            .and(authed.clone())
            .and(json_body())
            .and_then(|authed: ImagerAuthed, req: EditRequest| async move {
                let images = authed.edit(req).await.map_err(warp::reject::custom)?;
                Ok::<_, Rejection>(warp::reply::json(&images))
            });

        let download = warp::path!("api" / "images" / "download")
            .and(warp::post())
            .and(json_body())
            .and_then(download);

        generate.or(edit).or(download)
    };

    catalog
        .or(auth)
        .or(images)
        .recover(handle_rejection)
        .with(warp::log("ai_imager"))
}

fn json_body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

async fn authenticate(
    session: Option<String>,
    imager: Arc<Imager>,
) -> Result<ImagerAuthed, Rejection> {
    let session_id = session
        .as_deref()
        .and_then(|s| s.parse::<SessionId>().ok())
        .ok_or_else(|| warp::reject::custom(Error::Unauthorized))?;

    imager
        .authenticate(session_id)
        .await
        .map_err(warp::reject::custom)
}

fn session_cookie(value: String, secure: bool) -> cookie::CookieBuilder<'static> {
    Cookie::build((SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(secure)
}

fn with_session(authed: &ImagerAuthed, secure: bool) -> impl Reply {
    let cookie = session_cookie(authed.session_id().to_string(), secure).build();

    warp::reply::with_header(
        warp::reply::json(&authed.user().view()),
        header::SET_COOKIE,
        cookie.to_string(),
    )
}

async fn download(image: GeneratedImage) -> Result<impl Reply, Rejection> {
    let inline = InlineImage::parse_data_uri(&image.src)
        .map_err(|e| warp::reject::custom(Error::from(e)))?;

    let filename = download_filename(&image.prompt);
    info!("download {} as {filename}", image.id);

    Response::builder()
        .header(header::CONTENT_TYPE, &inline.mime_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .body(inline.bytes())
        .map_err(|e| {
            error!("couldn't build download response: {e:?}");
            warp::reject::custom(Error::Internal)
        })
}

#[derive(Serialize)]
struct ErrorReply<'a> {
    code: &'a str,
    message: String,
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, code, message) = if let Some(e) = err.find::<Error>() {
        (StatusCode::from(e), e.code(), e.message())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "NOT_FOUND", "Not found.".into())
    } else if let Some(e) = err.find::<warp::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, "BAD_REQUEST", e.to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            "PAYLOAD_TOO_LARGE",
            "The uploaded image is too large.".into(),
        )
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some()
        || err.find::<warp::reject::LengthRequired>().is_some()
    {
        (
            StatusCode::BAD_REQUEST,
            "BAD_REQUEST",
            "Expected a JSON body.".into(),
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "METHOD_NOT_ALLOWED",
            "Method not allowed.".into(),
        )
    } else {
        error!("unhandled rejection: {err:?}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL",
            "An unexpected error occurred.".into(),
        )
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&ErrorReply { code, message }),
        status,
    ))
}
