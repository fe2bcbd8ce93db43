//! OpenAI client for chat, speech, images and transcription.

use async_trait::async_trait;
use jjj_models::{ImageSize, Voice};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::services::providers::{
    error_message, observe, AudioUpload, ChatModel, ChatPrompt, MediaModel, ProviderError,
    ProviderResult,
};

const PROVIDER: &str = "openai";

pub struct OpenAiClient {
    api_key: Option<String>,
    base_url: String,
    chat_model: String,
    tts_model: String,
    image_model: String,
    stt_model: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

#[derive(Debug, Serialize)]
struct ImageGenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    size: &'a str,
    n: u32,
}

#[derive(Debug, Deserialize)]
struct ImageGenerationResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
    b64_json: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl OpenAiClient {
    pub fn new(client: Client, config: &ProviderConfig) -> Self {
        Self {
            api_key: config.openai_api_key.clone(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            chat_model: config.openai_chat_model.clone(),
            tts_model: config.openai_tts_model.clone(),
            image_model: config.openai_image_model.clone(),
            stt_model: config.openai_stt_model.clone(),
            client,
        }
    }

    fn api_key(&self) -> ProviderResult<&str> {
        self.api_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured("OpenAI"))
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> ProviderResult<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, endpoint))
            .bearer_auth(self.api_key()?)
            .json(body)
            .send()
            .await?;
        check_status(response).await
    }

    async fn call_chat(&self, prompt: &ChatPrompt) -> ProviderResult<String> {
        let system = prompt.system_instruction();
        let request = ChatCompletionRequest {
            model: &self.chat_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.message,
                },
            ],
            max_tokens: prompt.max_tokens,
        };

        let response: ChatCompletionResponse = self
            .post_json("chat/completions", &request)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse("no content in chat completion".into()))
    }

    async fn call_speech(&self, text: &str, voice: Voice) -> ProviderResult<Vec<u8>> {
        let request = SpeechRequest {
            model: &self.tts_model,
            input: text,
            voice: voice.as_str(),
            response_format: "mp3",
        };
        let bytes = self.post_json("audio/speech", &request).await?.bytes().await?;
        if bytes.is_empty() {
            return Err(ProviderError::InvalidResponse("empty audio body".into()));
        }
        Ok(bytes.to_vec())
    }

    async fn call_image(&self, prompt: &str, size: ImageSize) -> ProviderResult<String> {
        let request = ImageGenerationRequest {
            model: &self.image_model,
            prompt,
            size: size.as_str(),
            n: 1,
        };
        let response: ImageGenerationResponse = self
            .post_json("images/generations", &request)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let data = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("no image returned".into()))?;

        match (data.url, data.b64_json) {
            (Some(url), _) => Ok(url),
            (None, Some(b64)) => Ok(format!("data:image/png;base64,{}", b64)),
            (None, None) => Err(ProviderError::InvalidResponse("image has no url or data".into())),
        }
    }

    async fn call_transcribe(&self, audio: AudioUpload) -> ProviderResult<String> {
        let mut part = reqwest::multipart::Part::bytes(audio.bytes).file_name(audio.file_name);
        if let Some(mime) = audio.content_type.as_deref() {
            part = part.mime_str(mime)?;
        }
        let form = reqwest::multipart::Form::new()
            .text("model", self.stt_model.clone())
            .part("file", part);

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(self.api_key()?)
            .multipart(form)
            .send()
            .await?;

        let body: TranscriptionResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(body.text)
    }
}

async fn check_status(response: reqwest::Response) -> ProviderResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = error_message(response).await;
    Err(ProviderError::from_status(status.as_u16(), message))
}

#[async_trait]
impl ChatModel for OpenAiClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn complete(&self, prompt: &ChatPrompt) -> ProviderResult<String> {
        observe(PROVIDER, "chat", self.call_chat(prompt)).await
    }
}

#[async_trait]
impl MediaModel for OpenAiClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn speech(&self, text: &str, voice: Voice) -> ProviderResult<Vec<u8>> {
        observe(PROVIDER, "tts", self.call_speech(text, voice)).await
    }

    async fn image(&self, prompt: &str, size: ImageSize) -> ProviderResult<String> {
        observe(PROVIDER, "image", self.call_image(prompt, size)).await
    }

    async fn transcribe(&self, audio: AudioUpload) -> ProviderResult<String> {
        observe(PROVIDER, "stt", self.call_transcribe(audio)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, key: Option<&str>) -> OpenAiClient {
        let config = ProviderConfig {
            openai_api_key: key.map(str::to_string),
            openai_base_url: server.uri(),
            ..ProviderConfig::default()
        };
        OpenAiClient::new(Client::new(), &config)
    }

    fn prompt() -> ChatPrompt {
        ChatPrompt {
            message: "Hello".into(),
            max_tokens: 300,
            language: None,
        }
    }

    #[tokio::test]
    async fn test_chat_sends_token_cap_and_reads_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({ "max_tokens": 300 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": " Hi there " } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = client_for(&server, Some("sk-test")).complete(&prompt()).await.unwrap();
        assert_eq!(reply, "Hi there");
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_calling_out() {
        let server = MockServer::start().await;
        let err = client_for(&server, None).complete(&prompt()).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_statuses_are_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/audio/speech"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = client_for(&server, Some("sk-test"));
        assert!(matches!(
            client.complete(&prompt()).await,
            Err(ProviderError::RateLimited(_))
        ));
        assert!(matches!(
            client.speech("hi", Voice::Nova).await,
            Err(ProviderError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_image_falls_back_to_inline_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .and(body_partial_json(serde_json::json!({ "size": "256x256" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "b64_json": "aGVsbG8=" }]
            })))
            .mount(&server)
            .await;

        let image = client_for(&server, Some("sk-test"))
            .image("a cat", ImageSize::Small)
            .await
            .unwrap();
        assert_eq!(image, "data:image/png;base64,aGVsbG8=");
    }

    #[tokio::test]
    async fn test_transcription_posts_multipart() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/transcriptions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "text": "hello world" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let text = client_for(&server, Some("sk-test"))
            .transcribe(AudioUpload {
                file_name: "clip.webm".into(),
                content_type: Some("audio/webm".into()),
                bytes: vec![1, 2, 3],
            })
            .await
            .unwrap();
        assert_eq!(text, "hello world");

        let requests = server.received_requests().await.unwrap_or_default();
        let body = String::from_utf8_lossy(&requests[0].body).to_string();
        assert!(body.contains("name=\"file\""));
        assert!(body.contains("whisper-1"));
    }
}
