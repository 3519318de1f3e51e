use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        handshake::client::generate_key,
        http::{Request, Uri},
        Message,
    },
};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{SpeechSynthesizer, SynthesisOutput, SynthesisRequest, VoiceInfo, WordBoundary};
use crate::error::{ExportError, Result};

const TRUSTED_CLIENT_TOKEN: &str = "6A5AA1D4EAFF4E9FB37E23D68491D6F4";

const WSS_URL: &str =
    "wss://speech.platform.bing.com/consumer/speech/synthesize/readaloud/edge/v1";

const VOICE_LIST_URL: &str =
    "https://speech.platform.bing.com/consumer/speech/synthesize/readaloud/voices/list";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36 Edg/130.0.0.0";

const OUTPUT_FORMAT: &str = "audio-24khz-48kbitrate-mono-mp3";

/// Maximum retries for the streaming call.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (seconds): 2s, 4s, 8s.
const BASE_DELAY_SECS: u64 = 2;

/// Hard ceiling on one streaming session.
const STREAM_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for the Edge read-aloud speech service.
///
/// Synthesis runs over a websocket: one speech.config message, one SSML
/// message, then a stream of binary audio frames interleaved with
/// word-boundary metadata until `turn.end`.
pub struct EdgeTtsClient {
    http: reqwest::Client,
    voice_list_url: String,
}

impl Default for EdgeTtsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl EdgeTtsClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            voice_list_url: format!(
                "{VOICE_LIST_URL}?trustedclienttoken={TRUSTED_CLIENT_TOKEN}"
            ),
        }
    }

    /// Override the voice-list endpoint (testing).
    #[cfg(test)]
    pub fn with_voice_list_url(mut self, url: String) -> Self {
        self.voice_list_url = url;
        self
    }

    /// One full streaming session: connect, send config + SSML, collect
    /// audio and word boundaries until the turn ends.
    async fn synthesize_once(&self, request: &SynthesisRequest) -> Result<SynthesisOutput> {
        let connection_id = Uuid::new_v4().simple().to_string();
        let url = format!(
            "{WSS_URL}?TrustedClientToken={TRUSTED_CLIENT_TOKEN}\
             &Sec-MS-GEC={}&Sec-MS-GEC-Version=1-130.0.2849.68&ConnectionId={connection_id}",
            drm_token()
        );

        let uri: Uri = url
            .parse()
            .map_err(|e| ExportError::Network(format!("Invalid websocket URL: {e}")))?;
        let host = uri
            .host()
            .ok_or_else(|| ExportError::Network("No host in websocket URL".to_string()))?
            .to_string();

        let ws_request = Request::builder()
            .method("GET")
            .uri(&url)
            .header("Host", &host)
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header("Sec-WebSocket-Key", generate_key())
            .header("Pragma", "no-cache")
            .header("Cache-Control", "no-cache")
            .header("User-Agent", USER_AGENT)
            .header(
                "Origin",
                "chrome-extension://jdiccldimpdaibmpdkjnbmckianbfold",
            )
            .body(())
            .map_err(|e| ExportError::Network(format!("Failed to build websocket request: {e}")))?;

        let (mut stream, response) = connect_async(ws_request)
            .await
            .map_err(|e| ExportError::Network(format!("Websocket connection failed: {e}")))?;
        debug!("TTS websocket connected: {:?}", response.status());

        let timestamp = edge_timestamp();
        let config = format!(
            "X-Timestamp:{timestamp}\r\n\
             Content-Type:application/json; charset=utf-8\r\n\
             Path:speech.config\r\n\r\n\
             {{\"context\":{{\"synthesis\":{{\"audio\":{{\"metadataoptions\":{{\
             \"sentenceBoundaryEnabled\":false,\"wordBoundaryEnabled\":true}},\
             \"outputFormat\":\"{OUTPUT_FORMAT}\"}}}}}}}}"
        );
        stream
            .send(Message::Text(config))
            .await
            .map_err(|e| ExportError::Network(format!("Failed to send speech config: {e}")))?;

        let ssml = build_ssml(request);
        let ssml_message = format!(
            "X-RequestId:{connection_id}\r\n\
             Content-Type:application/ssml+xml\r\n\
             X-Timestamp:{timestamp}\r\n\
             Path:ssml\r\n\r\n{ssml}"
        );
        stream
            .send(Message::Text(ssml_message))
            .await
            .map_err(|e| ExportError::Network(format!("Failed to send SSML: {e}")))?;

        let mut output = SynthesisOutput::default();

        let collect = async {
            while let Some(message) = stream.next().await {
                let message = message
                    .map_err(|e| ExportError::Network(format!("Websocket stream error: {e}")))?;

                match message {
                    Message::Text(text) => {
                        let (headers, body) = split_frame(&text);
                        if headers.contains("Path:turn.end") {
                            return Ok(());
                        }
                        if headers.contains("Path:audio.metadata") {
                            output.word_boundaries.extend(parse_word_boundaries(body)?);
                        }
                    }
                    Message::Binary(data) => {
                        if let Some(audio) = split_binary_frame(&data) {
                            output.audio.extend_from_slice(audio);
                        }
                    }
                    Message::Close(_) => {
                        return Err(ExportError::Network(
                            "Websocket closed before turn end".to_string(),
                        ));
                    }
                    _ => {}
                }
            }
            Err(ExportError::Network(
                "Websocket stream ended before turn end".to_string(),
            ))
        };

        tokio::time::timeout(STREAM_TIMEOUT, collect)
            .await
            .map_err(|_| {
                ExportError::Network(format!(
                    "Speech stream timed out after {}s",
                    STREAM_TIMEOUT.as_secs()
                ))
            })??;

        if output.audio.is_empty() {
            return Err(ExportError::Generation(
                "Provider returned no audio data".to_string(),
            ));
        }

        debug!(
            "Synthesized {} bytes, {} word boundaries",
            output.audio.len(),
            output.word_boundaries.len()
        );
        Ok(output)
    }
}

#[async_trait]
impl SpeechSynthesizer for EdgeTtsClient {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesisOutput> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_DELAY_SECS * 2u64.pow(attempt - 1);
                debug!("Retry attempt {} after {}s delay", attempt, delay);
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }

            match self.synthesize_once(request).await {
                Ok(output) => return Ok(output),
                Err(e) if e.is_transient() => {
                    warn!("Synthesis attempt {} failed: {}", attempt + 1, e);
                    last_error = Some(e);
                }
                // Validation and provider rejections are never retried
                Err(e) => return Err(e),
            }
        }

        Err(ExportError::Generation(format!(
            "Synthesis failed after {MAX_RETRIES} attempts: {}",
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string())
        )))
    }

    async fn list_voices(&self) -> Result<Vec<VoiceInfo>> {
        debug!("Fetching available voices");

        let response = self
            .http
            .get(&self.voice_list_url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExportError::Generation(format!(
                "Voice list request failed with status {status}"
            )));
        }

        let raw: Vec<RawVoice> = response.json().await?;
        let voices = raw
            .into_iter()
            .map(|v| VoiceInfo {
                name: v.friendly_name.unwrap_or_else(|| v.short_name.clone()),
                short_name: v.short_name,
                gender: v.gender,
                locale: v.locale,
            })
            .collect::<Vec<_>>();

        debug!("Fetched {} voices", voices.len());
        Ok(voices)
    }

    fn name(&self) -> &'static str {
        "Edge TTS"
    }
}

/// Build the SSML synthesis request, escaping user narration.
fn build_ssml(request: &SynthesisRequest) -> String {
    format!(
        "<speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' xml:lang='en-US'>\
         <voice name='{}'><prosody pitch='{}' rate='{}' volume='{}'>{}</prosody></voice></speak>",
        request.voice,
        request.pitch,
        request.rate,
        request.volume,
        escape_xml(&request.text)
    )
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Split a text frame into its header block and body.
fn split_frame(frame: &str) -> (&str, &str) {
    match frame.split_once("\r\n\r\n") {
        Some((headers, body)) => (headers, body),
        None => (frame, ""),
    }
}

/// Binary frames carry a 2-byte big-endian header length, the header
/// text, then the raw audio payload.
fn split_binary_frame(data: &[u8]) -> Option<&[u8]> {
    if data.len() < 2 {
        return None;
    }
    let header_len = u16::from_be_bytes([data[0], data[1]]) as usize;
    let payload_start = 2 + header_len;
    if data.len() <= payload_start {
        return None;
    }

    let header = String::from_utf8_lossy(&data[2..payload_start]);
    if !header.contains("Path:audio") {
        return None;
    }
    Some(&data[payload_start..])
}

/// Parse an `audio.metadata` body into word boundaries. Offsets and
/// durations arrive as 100-nanosecond ticks.
fn parse_word_boundaries(body: &str) -> Result<Vec<WordBoundary>> {
    let metadata: MetadataFrame = serde_json::from_str(body)?;

    Ok(metadata
        .metadata
        .into_iter()
        .filter(|m| m.kind == "WordBoundary")
        .map(|m| WordBoundary {
            offset: ticks_to_duration(m.data.offset),
            duration: ticks_to_duration(m.data.duration),
            text: m.data.text.text,
        })
        .collect())
}

fn ticks_to_duration(ticks: u64) -> Duration {
    Duration::from_nanos(ticks * 100)
}

/// Anti-bot handshake token: SHA-256 over the current Windows file time
/// rounded down to five minutes, concatenated with the client token.
fn drm_token() -> String {
    let unix_secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    // Seconds between 1601-01-01 and 1970-01-01
    let windows_secs = unix_secs + 11_644_473_600;
    let ticks = (windows_secs - windows_secs % 300) * 10_000_000;

    let mut hasher = Sha256::new();
    hasher.update(format!("{ticks}{TRUSTED_CLIENT_TOKEN}").as_bytes());
    format!("{:X}", hasher.finalize())
}

fn edge_timestamp() -> String {
    chrono::Utc::now()
        .format("%a %b %d %Y %H:%M:%S GMT+0000 (Coordinated Universal Time)")
        .to_string()
}

// Voice list response shape

#[derive(Debug, Deserialize)]
struct RawVoice {
    #[serde(rename = "ShortName")]
    short_name: String,
    #[serde(rename = "Gender")]
    gender: String,
    #[serde(rename = "Locale")]
    locale: String,
    #[serde(rename = "FriendlyName")]
    friendly_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MetadataFrame {
    #[serde(rename = "Metadata")]
    metadata: Vec<MetadataItem>,
}

#[derive(Debug, Deserialize)]
struct MetadataItem {
    #[serde(rename = "Type")]
    kind: String,
    #[serde(rename = "Data")]
    data: MetadataData,
}

#[derive(Debug, Deserialize)]
struct MetadataData {
    #[serde(rename = "Offset")]
    offset: u64,
    #[serde(rename = "Duration", default)]
    duration: u64,
    text: MetadataText,
}

#[derive(Debug, Deserialize)]
struct MetadataText {
    #[serde(rename = "Text")]
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_build_ssml_escapes_text() {
        let request = SynthesisRequest {
            text: "Tom & Jerry <3".to_string(),
            voice: "en-US-AvaMultilingualNeural".to_string(),
            rate: "+10%".to_string(),
            volume: "-5%".to_string(),
            pitch: "+2Hz".to_string(),
        };

        let ssml = build_ssml(&request);
        assert!(ssml.contains("Tom &amp; Jerry &lt;3"));
        assert!(ssml.contains("rate='+10%'"));
        assert!(ssml.contains("pitch='+2Hz'"));
        assert!(ssml.contains("volume='-5%'"));
        assert!(ssml.contains("name='en-US-AvaMultilingualNeural'"));
    }

    #[test]
    fn test_split_binary_frame() {
        let header = b"Path:audio\r\n";
        let mut frame = Vec::new();
        frame.extend_from_slice(&(header.len() as u16).to_be_bytes());
        frame.extend_from_slice(header);
        frame.extend_from_slice(b"AUDIO");

        assert_eq!(split_binary_frame(&frame), Some(b"AUDIO".as_slice()));
        // Frames without audio payload are skipped
        assert_eq!(split_binary_frame(&frame[..2 + header.len()]), None);
        assert_eq!(split_binary_frame(b"x"), None);
    }

    #[test]
    fn test_parse_word_boundaries() {
        let body = r#"{"Metadata":[
            {"Type":"WordBoundary","Data":{"Offset":10000000,"Duration":5000000,"text":{"Text":"Hello","Length":5,"BoundaryType":"WordBoundary"}}},
            {"Type":"SessionEnd","Data":{"Offset":0,"Duration":0,"text":{"Text":""}}}
        ]}"#;

        let boundaries = parse_word_boundaries(body).unwrap();
        assert_eq!(boundaries.len(), 1);
        assert_eq!(boundaries[0].text, "Hello");
        assert_eq!(boundaries[0].offset, Duration::from_secs(1));
        assert_eq!(boundaries[0].duration, Duration::from_millis(500));
    }

    #[test]
    fn test_drm_token_shape() {
        let token = drm_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_list_voices_parses_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/voices"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "Name": "Microsoft Server Speech Text to Speech Voice (en-US, AvaMultilingualNeural)",
                    "ShortName": "en-US-AvaMultilingualNeural",
                    "Gender": "Female",
                    "Locale": "en-US",
                    "FriendlyName": "Microsoft Ava Online (Natural) - English (United States)"
                }
            ])))
            .mount(&server)
            .await;

        let client = EdgeTtsClient::new()
            .with_voice_list_url(format!("{}/voices", server.uri()));
        let voices = client.list_voices().await.unwrap();

        assert_eq!(voices.len(), 1);
        assert_eq!(voices[0].short_name, "en-US-AvaMultilingualNeural");
        assert_eq!(voices[0].gender, "Female");
        assert_eq!(voices[0].locale, "en-US");
    }

    #[tokio::test]
    async fn test_list_voices_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/voices"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = EdgeTtsClient::new()
            .with_voice_list_url(format!("{}/voices", server.uri()));
        assert!(client.list_voices().await.is_err());
    }
}
