//! Job repository over an HTTP create → poll → download API

use super::repository::AsyncJobRepository;
use super::types::{AsyncJob, AsyncJobConfig, AsyncJobStatus};
use crate::decode::{decoder_for, extract_path, Decoder, JsonDecoder};
use crate::error::{Error, Result, ResultExt};
use crate::http::{LogFormatter, RequestConfig, Requester};
use crate::partition::StreamSlice;
use crate::template::{render, render_value, TemplateContext};
use crate::types::{JsonObject, JsonValue};
use async_trait::async_trait;
use reqwest::{Method, Response};
use std::sync::Arc;
use tracing::debug;

/// Runs jobs through a [`Requester`] following an [`AsyncJobConfig`]
pub struct HttpJobRepository {
    requester: Arc<dyn Requester>,
    job_config: AsyncJobConfig,
    config: JsonValue,
    log_formatter: Option<Arc<LogFormatter<'static>>>,
}

impl HttpJobRepository {
    pub fn new(requester: Arc<dyn Requester>, job_config: AsyncJobConfig) -> Self {
        Self {
            requester,
            job_config,
            config: JsonValue::Null,
            log_formatter: None,
        }
    }

    /// Connector config exposed to templates as `config.*`
    #[must_use]
    pub fn with_config(mut self, config: JsonValue) -> Self {
        self.config = config;
        self
    }

    /// Formatter used to log every response
    #[must_use]
    pub fn with_log_formatter(mut self, formatter: Arc<LogFormatter<'static>>) -> Self {
        self.log_formatter = Some(formatter);
        self
    }

    fn context(&self, slice: &StreamSlice, job_id: Option<&str>) -> TemplateContext {
        let ctx = TemplateContext::with_config(self.config.clone()).with_slice(slice);
        match job_id {
            Some(id) => ctx.with_job_id(id),
            None => ctx,
        }
    }

    async fn send(&self, method: Method, path: &str, request: RequestConfig) -> Result<Option<Response>> {
        self.requester
            .send_request(method, path, request, self.log_formatter.as_deref())
            .await
    }

    async fn json_body(response: Response) -> Result<JsonValue> {
        let body = response.bytes().await?;
        JsonDecoder::new().decode_raw(&body)
    }
}

#[async_trait]
impl AsyncJobRepository for HttpJobRepository {
    async fn start(&self, slice: StreamSlice) -> Result<AsyncJob> {
        let method = Method::from_bytes(self.job_config.create_method.as_bytes()).map_err(|_| {
            Error::invalid_value(
                "create_method",
                format!("'{}' is not an HTTP method", self.job_config.create_method),
            )
        })?;
        let ctx = self.context(&slice, None);
        let path = render(&self.job_config.create_path, &ctx)?;
        let mut request = RequestConfig::new();
        if let Some(body) = &self.job_config.create_body {
            request = request.json(render_value(body, &ctx)?);
        }

        let response = self.send(method, &path, request).await?.ok_or_else(|| {
            Error::system(format!("Creating a job for slice {slice} returned no response"))
        })?;
        let body = Self::json_body(response).await?;

        let job_id = match extract_path(&body, &self.job_config.job_id_path) {
            Some(JsonValue::String(id)) if !id.is_empty() => id,
            Some(JsonValue::Number(n)) => n.to_string(),
            _ => {
                return Err(Error::system(format!(
                    "Job creation response has no job id at '{}': {body}",
                    self.job_config.job_id_path
                )))
            }
        };
        debug!(job_id = %job_id, slice = %slice, "Created job");
        Ok(AsyncJob::new(job_id, slice))
    }

    async fn update_jobs_status(&self, jobs: &mut [AsyncJob]) -> Result<()> {
        for job in jobs.iter_mut().filter(|job| !job.status().is_terminal()) {
            let ctx = self.context(job.slice(), Some(job.api_job_id()));
            let path = render(&self.job_config.poll_path, &ctx)?;

            let Some(response) = self.send(Method::GET, &path, RequestConfig::new()).await? else {
                continue;
            };
            let body = Self::json_body(response).await?;
            job.update_status(self.job_config.status_of(&body));
        }
        Ok(())
    }

    async fn fetch_records(&self, job: &AsyncJob) -> Result<Vec<JsonObject>> {
        if job.status() != AsyncJobStatus::Completed {
            return Err(Error::JobNotCompleted {
                job_id: job.api_job_id().to_string(),
                status: job.status().to_string(),
            });
        }

        let ctx = self.context(job.slice(), Some(job.api_job_id()));
        let path = render(&self.job_config.download_path, &ctx)?;
        let Some(response) = self.send(Method::GET, &path, RequestConfig::new()).await? else {
            return Ok(Vec::new());
        };
        let body = response.bytes().await?;

        let decoder = decoder_for(
            self.job_config.download_format,
            self.job_config.records_path.as_deref(),
        );
        decoder
            .decode(&body)
            .with_context(|| format!("Results of job '{}'", job.api_job_id()))
    }

    async fn abort(&self, job: &AsyncJob) -> Result<()> {
        let Some(abort_path) = &self.job_config.abort_path else {
            return Ok(());
        };
        let ctx = self.context(job.slice(), Some(job.api_job_id()));
        let path = render(abort_path, &ctx)?;
        self.send(Method::DELETE, &path, RequestConfig::new().retries(0))
            .await?;
        Ok(())
    }
}
