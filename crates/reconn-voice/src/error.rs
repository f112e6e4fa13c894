use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    /// The request never produced a response (connect failure, timeout, reset).
    #[error("{service} request failed: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },

    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} response could not be decoded: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl VoiceError {
    pub(crate) fn transport(service: &'static str, err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("timed out: {err}")
        } else {
            err.to_string()
        };
        Self::Transport { service, message }
    }

    pub(crate) fn decode(service: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            service,
            message: err.to_string(),
        }
    }

    /// Turns a non-2xx response into [`VoiceError::Status`], keeping a
    /// bounded prefix of the body for the log.
    pub(crate) async fn from_response(service: &'static str, response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > 512 {
            let mut cut = 512;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Self::Status {
            service,
            status,
            body,
        }
    }
}
