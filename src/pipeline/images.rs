//! Image resolution: one illustration per slide, best effort.
//!
//! Every slide gets exactly one search-and-download attempt, bounded by
//! `image_timeout_secs`. Lookups run concurrently (`image_concurrency` at a
//! time) and are re-ordered by slide index afterwards, so the output lines up
//! with the input regardless of completion order. A failed lookup never fails
//! the request: the slide simply renders without an image and the reason is
//! kept on [`ResolvedSlide::image_error`].

use crate::config::PresentationConfig;
use crate::error::{ImageError, SlidesError};
use crate::pipeline::parse::is_http_url;
use crate::slide::{ImageAsset, ResolvedSlide, SlideRecord};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Default Openverse image search endpoint.
pub const OPENVERSE_SEARCH_URL: &str = "https://api.openverse.org/v1/images/";

/// Search results requested per query; the first usable one is downloaded.
const SEARCH_PAGE_SIZE: &str = "5";

/// Finds and downloads an illustration for a query.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, query: &str) -> Result<ImageAsset, ImageError>;
}

// ── Web image source ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    url: Option<String>,
    thumbnail: Option<String>,
}

impl SearchResult {
    /// Thumbnails are smaller and faster; full-size is the fallback.
    fn download_url(&self) -> Option<&str> {
        self.thumbnail
            .as_deref()
            .filter(|u| is_http_url(u))
            .or_else(|| self.url.as_deref().filter(|u| is_http_url(u)))
    }
}

/// [`ImageSource`] backed by an Openverse-compatible search API.
///
/// Queries that are themselves http(s) URLs are downloaded directly.
pub struct WebImageSource {
    http_client: reqwest::Client,
    search_url: String,
    max_bytes: u64,
}

impl WebImageSource {
    pub fn new(search_url: impl Into<String>, max_bytes: u64) -> Result<Self, SlidesError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("edgequake-slides/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SlidesError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            http_client,
            search_url: search_url.into(),
            max_bytes,
        })
    }

    async fn search(&self, query: &str) -> Result<String, ImageError> {
        let response = self
            .http_client
            .get(&self.search_url)
            .query(&[("q", query), ("page_size", SEARCH_PAGE_SIZE)])
            .send()
            .await
            .map_err(|e| ImageError::Network {
                detail: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImageError::Http {
                url: self.search_url.clone(),
                status: status.as_u16(),
            });
        }

        let body: SearchResponse = response.json().await.map_err(|e| ImageError::Network {
            detail: format!("invalid search response: {e}"),
        })?;

        body.results
            .iter()
            .find_map(|r| r.download_url().map(str::to_string))
            .ok_or_else(|| ImageError::NoResults {
                query: query.to_string(),
            })
    }

    async fn download(&self, url: &str) -> Result<ImageAsset, ImageError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| ImageError::Network {
                detail: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImageError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if let Some(len) = response.content_length() {
            if len > self.max_bytes {
                return Err(ImageError::TooLarge {
                    bytes: len,
                    limit: self.max_bytes,
                });
            }
        }

        let declared = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut bytes = Vec::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| ImageError::Network {
                detail: e.to_string(),
            })?;
            bytes.extend_from_slice(&chunk);
            if bytes.len() as u64 > self.max_bytes {
                return Err(ImageError::TooLarge {
                    bytes: bytes.len() as u64,
                    limit: self.max_bytes,
                });
            }
        }

        let content_type = accepted_content_type(declared.as_deref(), &bytes)?;

        Ok(ImageAsset {
            bytes,
            content_type: content_type.to_string(),
            source_url: Some(url.to_string()),
        })
    }
}

#[async_trait]
impl ImageSource for WebImageSource {
    async fn fetch(&self, query: &str) -> Result<ImageAsset, ImageError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ImageError::InvalidQuery {
                query: query.to_string(),
            });
        }

        let url = if is_http_url(query) {
            query.to_string()
        } else {
            self.search(query).await?
        };

        debug!(query = %query, url = %url, "Downloading slide image");
        self.download(&url).await
    }
}

/// Decide whether a payload is a PNG or JPEG.
///
/// An explicit image type is trusted; a missing or generic type falls back
/// to magic-byte sniffing.
pub fn accepted_content_type(declared: Option<&str>, bytes: &[u8]) -> Result<&'static str, ImageError> {
    let essence = declared
        .map(|d| d.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
        .unwrap_or_default();

    match essence.as_str() {
        "image/png" => return Ok("image/png"),
        "image/jpeg" | "image/jpg" | "image/pjpeg" => return Ok("image/jpeg"),
        "" | "application/octet-stream" | "binary/octet-stream" => {}
        other => {
            return Err(ImageError::UnsupportedType {
                content_type: other.to_string(),
            })
        }
    }

    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) => Ok("image/png"),
        Ok(image::ImageFormat::Jpeg) => Ok("image/jpeg"),
        Ok(format) => Err(ImageError::UnsupportedType {
            content_type: format!("{format:?}").to_lowercase(),
        }),
        Err(_) => Err(ImageError::UnsupportedType {
            content_type: if essence.is_empty() {
                "unknown".into()
            } else {
                essence
            },
        }),
    }
}

/// The image source for a request: the injected one, else the web source.
pub fn image_source_for(config: &PresentationConfig) -> Result<Arc<dyn ImageSource>, SlidesError> {
    match config.image_source {
        Some(ref source) => Ok(Arc::clone(source)),
        None => Ok(Arc::new(WebImageSource::new(
            config.image_search_url.clone(),
            config.max_image_bytes,
        )?)),
    }
}

// ── Fan-out ──────────────────────────────────────────────────────────────────

/// Attach an image outcome to every slide, preserving slide order.
pub async fn resolve_images(
    slides: Vec<SlideRecord>,
    source: Arc<dyn ImageSource>,
    config: &PresentationConfig,
) -> Vec<ResolvedSlide> {
    if !config.fetch_images {
        debug!("Image fetching disabled");
        return slides.into_iter().map(ResolvedSlide::without_image).collect();
    }

    let total = slides.len();
    let secs = config.image_timeout_secs;
    info!(
        "Resolving images for {} slides ({} concurrent, {}s timeout)",
        total, config.image_concurrency, secs
    );

    let mut resolved: Vec<(usize, ResolvedSlide)> =
        stream::iter(slides.into_iter().enumerate().map(|(idx, record)| {
            let source = Arc::clone(&source);
            let callback = config.progress_callback.clone();
            async move {
                let slide = idx + 1;
                if let Some(ref cb) = callback {
                    cb.on_image_start(slide, total);
                }

                let outcome =
                    match timeout(Duration::from_secs(secs), source.fetch(&record.image_query)).await
                    {
                        Ok(outcome) => outcome,
                        Err(_) => Err(ImageError::Timeout { secs }),
                    };

                match &outcome {
                    Ok(asset) => {
                        debug!("Slide {}: image {} bytes", slide, asset.bytes.len());
                        if let Some(ref cb) = callback {
                            cb.on_image_resolved(slide, total, asset.bytes.len());
                        }
                    }
                    Err(e) => {
                        warn!("Slide {}: no image ({})", slide, e);
                        if let Some(ref cb) = callback {
                            cb.on_image_missing(slide, total, &e.to_string());
                        }
                    }
                }

                (idx, ResolvedSlide::from_outcome(record, outcome))
            }
        }))
        .buffer_unordered(config.image_concurrency.max(1))
        .collect()
        .await;

    resolved.sort_by_key(|(idx, _)| *idx);
    resolved.into_iter().map(|(_, slide)| slide).collect()
}
