use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::io::Cursor;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use colorizers::{Colorizer, ColorizerError};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use image::{DynamicImage, ImageFormat, ImageReader, Limits};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{ImagerError, Result};
use crate::settings::ApiSettings;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    Jpeg,
}

impl OutputFormat {
    pub fn image_format(self) -> ImageFormat {
        match self {
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::Jpeg => ImageFormat::Jpeg,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ImagerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(OutputFormat::Png),
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            _ => Err(ImagerError::InvalidParam {
                param: "format",
                value: s.to_owned(),
            }),
        }
    }
}

/// Which image of the colorized pair goes into the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Colorized,
    /// Original and colorized side by side.
    Pair,
}

impl FromStr for OutputMode {
    type Err = ImagerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "colorized" => Ok(OutputMode::Colorized),
            "pair" => Ok(OutputMode::Pair),
            _ => Err(ImagerError::InvalidParam {
                param: "output",
                value: s.to_owned(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorizeQuery {
    pub output: OutputMode,
    pub format: OutputFormat,
}

impl ColorizeQuery {
    pub fn from_params(param_map: &HashMap<String, String>, default_format: OutputFormat) -> Result<Self> {
        let output = match param_map.get("output") {
            Some(value) => value.parse()?,
            None => OutputMode::Colorized,
        };
        let format = match param_map.get("format") {
            Some(value) => value.parse()?,
            None => default_format,
        };
        Ok(ColorizeQuery { output, format })
    }
}

/// Description of the resource, returned on `GET`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceInfo {
    pub name: String,
    pub model: String,
    pub input_size: [u32; 2],
    pub outputs: Vec<&'static str>,
    pub formats: Vec<&'static str>,
}

impl ResourceInfo {
    pub fn new(model: &str, input_size: u32) -> Self {
        ResourceInfo {
            name: "colorizer".to_owned(),
            model: model.to_owned(),
            input_size: [input_size, input_size],
            outputs: vec!["colorized", "pair"],
            formats: vec!["png", "jpeg"],
        }
    }
}

/// Decode an encoded image. Dimensions above the maximum are refused before
/// any pixel buffer is allocated.
pub fn decode(body: &[u8], max_width: u32, max_height: u32) -> Result<DynamicImage> {
    let mut limits = Limits::default();
    limits.max_image_width = Some(max_width);
    limits.max_image_height = Some(max_height);

    let mut reader = ImageReader::new(Cursor::new(body))
        .with_guessed_format()
        .map_err(|e| ColorizerError::from(image::ImageError::IoError(e)))?;
    reader.limits(limits);
    reader.decode().map_err(|e| match e {
        image::ImageError::Limits(err) => ImagerError::ImageTooLarge {
            message: err.to_string(),
            max_width,
            max_height,
        },
        other => ColorizerError::from(other).into(),
    })
}

/// Colorize a decoded image and encode the requested output.
pub fn render(colorizer: &dyn Colorizer, image: &DynamicImage, query: ColorizeQuery) -> Result<Vec<u8>> {
    let pair = colorizer.colorize(image)?;
    let image = match query.output {
        OutputMode::Colorized => pair.colorized,
        OutputMode::Pair => pair.side_by_side(),
    };
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image).write_to(&mut buffer, query.format.image_format())?;
    Ok(buffer.into_inner())
}

async fn read_body<B>(body: B, limit: usize) -> Result<Bytes>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
            Err(ImagerError::PayloadTooLarge { limit })
        }
        Err(err) => Err(ImagerError::BodyError {
            message: err.to_string(),
        }),
    }
}

fn response(status: StatusCode, content_type: &'static str, body: Vec<u8>) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::from(body)));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    resp
}

fn error_response(err: &ImagerError) -> Response<Full<Bytes>> {
    let body = serde_json::json!({ "message": err.to_string() });
    response(err.status(), "application/json", body.to_string().into_bytes())
}

// The colorizer API resource, served under a fixed path prefix.
#[derive(Clone)]
pub struct ColorizerService {
    colorizer: Arc<dyn Colorizer + Send + Sync>,
    api: ApiSettings,
    info: ResourceInfo,
}

impl ColorizerService {
    pub fn new(colorizer: Arc<dyn Colorizer + Send + Sync>, api: ApiSettings, info: ResourceInfo) -> Self {
        ColorizerService { colorizer, api, info }
    }

    pub fn prefix(&self) -> &str {
        &self.api.prefix
    }

    fn matches_prefix(&self, path: &str) -> bool {
        path.trim_end_matches('/') == self.api.prefix.trim_end_matches('/')
    }

    /// Route one request. Failures become JSON error responses.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let started = Instant::now();
        let method = req.method().clone();
        let path = req.uri().path().to_owned();

        let resp = match self.route(req).await {
            Ok(resp) => resp,
            Err(err) => {
                warn!("{} {} failed: {}", method, path, err);
                error_response(&err)
            }
        };
        info!(
            "{} {} -> {} in {:?}",
            method,
            path,
            resp.status().as_u16(),
            started.elapsed()
        );
        resp
    }

    async fn route<B>(&self, req: Request<B>) -> Result<Response<Full<Bytes>>>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        if !self.matches_prefix(req.uri().path()) {
            return Err(ImagerError::NotFound {
                path: req.uri().path().to_owned(),
            });
        }
        match *req.method() {
            Method::GET => self.describe(),
            Method::POST => self.colorize(req).await,
            _ => Err(ImagerError::MethodNotAllowed {
                method: req.method().to_string(),
                path: req.uri().path().to_owned(),
            }),
        }
    }

    fn describe(&self) -> Result<Response<Full<Bytes>>> {
        let body = serde_json::to_vec(&self.info)?;
        Ok(response(StatusCode::OK, "application/json", body))
    }

    async fn colorize<B>(&self, req: Request<B>) -> Result<Response<Full<Bytes>>>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let req_query_url = req.uri().query().unwrap_or("");
        let query_map: HashMap<String, String> = url::form_urlencoded::parse(req_query_url.as_bytes())
            .into_owned()
            .collect();
        let query = ColorizeQuery::from_params(&query_map, self.api.default_format)?;
        debug!("colorize query: {:?}", query);

        let body = read_body(req.into_body(), self.api.max_body_bytes).await?;
        if body.is_empty() {
            return Err(ImagerError::EmptyBody);
        }

        let colorizer = Arc::clone(&self.colorizer);
        let (max_width, max_height) = (self.api.max_image_width, self.api.max_image_height);
        let encoded = tokio::task::spawn_blocking(move || {
            let image = decode(&body, max_width, max_height)?;
            render(colorizer.as_ref(), &image, query)
        })
        .await
            .map_err(|e| ImagerError::TaskError {
                message: e.to_string(),
            })??;

        Ok(response(StatusCode::OK, query.format.content_type(), encoded))
    }
}

impl Service<Request<Incoming>> for ColorizerService {
    type Response = Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { Ok(service.handle(req).await) })
    }
}
