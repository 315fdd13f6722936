use anyhow::{Context, Result, bail};
use reqwest::{
    Client,
    multipart::{Form, Part},
};
use serde::Deserialize;
use serde_json::Value;

/// Client for the external banknote image-generation service.
///
/// The service exposes `POST /run` (multipart: input image + sample choice)
/// for a full generation pass and `POST /regenerate-step2` (run id + sample
/// choice) for cheaper follow-up variations against an existing run.
#[derive(Clone)]
pub struct GeneratorClient {
    http: Client,
    base_url: String,
}

/// Raw response surface of both generation endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationResponse {
    pub returncode: i32,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub step_outputs: Option<Value>,
    #[serde(default)]
    pub banknote_used: Option<String>,
}

/// A successful generation, reduced to what the wizard needs.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub run_id: String,
    pub image_url: String,
    pub banknote_used: Option<String>,
}

impl GeneratorClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Resolves a service-relative path (e.g. `/outputs/<run>/<file>`) to an
    /// absolute URL clients can load directly.
    pub fn absolute_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    /// URL of a sample banknote image served by the generation service.
    pub fn sample_url(&self, image: &str) -> String {
        format!("{}/samples/{}", self.base_url, image.trim_start_matches('/'))
    }

    /// Full generation pass: uploads the visitor's photo together with the
    /// chosen sample banknote name.
    pub async fn run(
        &self,
        image_bytes: Vec<u8>,
        filename: &str,
        content_type: &str,
        sample_choice: &str,
    ) -> Result<GenerationOutcome> {
        let part = Part::bytes(image_bytes)
            .file_name(filename.to_string())
            .mime_str(content_type)
            .context("invalid upload content type")?;
        let form = Form::new()
            .part("input_image", part)
            .text("sample_choice", sample_choice.to_string());

        let response = self
            .http
            .post(format!("{}/run", self.base_url))
            .multipart(form)
            .send()
            .await
            .context("generation service unreachable")?;

        self.handle_response(response).await
    }

    /// Cheaper follow-up: asks the service to re-run the final step of an
    /// existing generation.
    pub async fn regenerate(&self, run_id: &str, sample_choice: &str) -> Result<GenerationOutcome> {
        let form = Form::new()
            .text("run_id", run_id.to_string())
            .text("sample_choice", sample_choice.to_string());

        let response = self
            .http
            .post(format!("{}/regenerate-step2", self.base_url))
            .multipart(form)
            .send()
            .await
            .context("generation service unreachable")?;

        self.handle_response(response).await
    }

    async fn handle_response(&self, response: reqwest::Response) -> Result<GenerationOutcome> {
        let status = response.status();
        if !status.is_success() {
            bail!("generation service returned HTTP {status}");
        }

        let payload: GenerationResponse = response
            .json()
            .await
            .context("failed to decode generation service response")?;

        if payload.returncode != 0 {
            bail!("generation failed with returncode {}", payload.returncode);
        }

        let run_id = payload
            .run_id
            .clone()
            .or_else(|| payload.outputs.first().and_then(run_id_from_output))
            .context("generation response carried no run id")?;

        let output = payload
            .outputs
            .last()
            .context("generation response carried no outputs")?;

        Ok(GenerationOutcome {
            run_id,
            image_url: self.absolute_url(output),
            banknote_used: payload.banknote_used,
        })
    }
}

// Output paths look like `/outputs/<run_id>/<filename>`.
fn run_id_from_output(path: &String) -> Option<String> {
    let mut segments = path.trim_start_matches('/').split('/');
    match (segments.next(), segments.next()) {
        (Some("outputs"), Some(run_id)) if !run_id.is_empty() => Some(run_id.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_url_joins_relative_paths() {
        let client = GeneratorClient::new("http://localhost:5000/");
        assert_eq!(
            client.absolute_url("/outputs/abc/result.png"),
            "http://localhost:5000/outputs/abc/result.png"
        );
        assert_eq!(
            client.absolute_url("https://cdn.example.com/x.png"),
            "https://cdn.example.com/x.png"
        );
    }

    #[test]
    fn sample_url_points_at_samples_dir() {
        let client = GeneratorClient::new("http://localhost:5000");
        assert_eq!(
            client.sample_url("currency-500k.jpg"),
            "http://localhost:5000/samples/currency-500k.jpg"
        );
    }

    #[test]
    fn run_id_recovered_from_output_path() {
        assert_eq!(
            run_id_from_output(&"/outputs/a1b2/final.png".to_string()),
            Some("a1b2".to_string())
        );
        assert_eq!(run_id_from_output(&"/other/a1b2/final.png".to_string()), None);
    }
}
