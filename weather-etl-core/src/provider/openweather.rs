use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};

use crate::{config::ClientConfig, model::RawObservation};

use super::{FetchError, WeatherProvider};

/// Client for the OpenWeather "current weather" endpoint.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenWeatherClient {
    pub fn new(config: ClientConfig) -> reqwest::Result<Self> {
        let http = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            api_key: config.api_key,
            base_url: config.base_url,
            http,
        })
    }

    fn request(&self, city: &str) -> reqwest::RequestBuilder {
        self.http.get(&self.base_url).query(&[
            ("q", city),
            ("appid", self.api_key.as_str()),
            ("units", "metric"),
        ])
    }

    /// The exact URL a fetch for `city` would hit.
    pub fn request_url(&self, city: &str) -> reqwest::Result<Url> {
        Ok(self.request(city).build()?.url().clone())
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherClient {
    async fn fetch(&self, city: &str) -> Result<RawObservation, FetchError> {
        log::debug!("requesting current weather for {city}");

        // The request URL carries `appid`; never let it into an error message.
        let transport = |source: reqwest::Error| FetchError::Transport {
            city: city.to_string(),
            source: source.without_url(),
        };

        let res = self.request(city).send().await.map_err(transport)?;
        let status = res.status();
        let body = res.text().await.map_err(transport)?;

        into_observation(city, status, &body)
    }
}

/// Map a status and body to an observation; anything but 200 is a skip.
fn into_observation(
    city: &str,
    status: StatusCode,
    body: &str,
) -> Result<RawObservation, FetchError> {
    if status != StatusCode::OK {
        return Err(FetchError::Status {
            city: city.to_string(),
            status: status.as_u16(),
            body: truncate_body(body),
        });
    }

    serde_json::from_str(body)
        .map(RawObservation::new)
        .map_err(|source| FetchError::Decode {
            city: city.to_string(),
            source,
        })
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn client(base_url: &str) -> OpenWeatherClient {
        OpenWeatherClient::new(ClientConfig {
            api_key: "SECRET".into(),
            base_url: base_url.into(),
            timeout: Duration::from_secs(2),
        })
        .expect("client builds")
    }

    fn query_value(url: &Url, key: &str) -> Option<String> {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    #[test]
    fn request_url_carries_city_key_and_units() {
        let url = client("https://api.openweathermap.org/data/2.5/weather")
            .request_url("Ankara")
            .expect("url");

        assert_eq!(url.path(), "/data/2.5/weather");
        assert_eq!(query_value(&url, "q").as_deref(), Some("Ankara"));
        assert_eq!(query_value(&url, "appid").as_deref(), Some("SECRET"));
        assert_eq!(query_value(&url, "units").as_deref(), Some("metric"));
    }

    #[test]
    fn non_ascii_city_is_percent_encoded() {
        let url = client("https://api.openweathermap.org/data/2.5/weather")
            .request_url("Şanlıurfa")
            .expect("url");

        let query = url.query().expect("query string");
        assert!(query.contains("q=%C5%9Eanl%C4%B1urfa"), "query was {query}");
        assert_eq!(query_value(&url, "q").as_deref(), Some("Şanlıurfa"));
    }

    #[test]
    fn ok_json_body_becomes_observation() {
        let raw = into_observation("Van", StatusCode::OK, r#"{"name":"Van"}"#).expect("ok");
        assert_eq!(raw.as_json()["name"], "Van");
    }

    #[test]
    fn non_200_is_status_error() {
        let err = into_observation("Ankara", StatusCode::NOT_FOUND, r#"{"message":"city not found"}"#)
            .unwrap_err();

        assert_eq!(err.status(), Some(404));
        assert!(err.to_string().contains("Ankara"));
    }

    #[test]
    fn other_success_codes_are_still_skipped() {
        let err = into_observation("Van", StatusCode::NO_CONTENT, "").unwrap_err();
        assert_eq!(err.status(), Some(204));
    }

    #[test]
    fn ok_with_garbage_body_is_decode_error() {
        let err = into_observation("Van", StatusCode::OK, "<html>").unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let body = "ş".repeat(150);
        let out = truncate_body(&body);

        assert!(out.ends_with("..."));
        assert!(out.len() <= 203);
    }

    #[tokio::test]
    async fn connection_refused_is_transport_error() {
        let err = client("http://127.0.0.1:1/data/2.5/weather")
            .fetch("Samsun")
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Transport { .. }));
        assert_eq!(err.status(), None);
    }

    fn error_chain(err: &FetchError) -> String {
        let mut out = format!("{err} | {err:?}");
        let mut source = std::error::Error::source(err);
        while let Some(e) = source {
            out.push_str(&format!(" | {e} | {e:?}"));
            source = e.source();
        }
        out
    }

    #[tokio::test]
    async fn transport_error_does_not_leak_api_key() {
        let client = OpenWeatherClient::new(ClientConfig {
            api_key: "SECRET_KEY_123".into(),
            base_url: "http://127.0.0.1:1/data/2.5/weather".into(),
            timeout: Duration::from_secs(2),
        })
        .expect("client builds");

        let err = client.fetch("Van").await.unwrap_err();

        assert!(matches!(err, FetchError::Transport { .. }));
        let text = error_chain(&err);
        assert!(!text.contains("SECRET_KEY_123"), "key leaked: {text}");
        assert!(text.contains("Van"));
    }

    #[tokio::test]
    async fn silent_server_hits_request_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        // Accept and hold the connection without ever answering.
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let client = OpenWeatherClient::new(ClientConfig {
            api_key: "SECRET".into(),
            base_url: format!("http://{addr}/data/2.5/weather"),
            timeout: Duration::from_millis(300),
        })
        .expect("client builds");

        let started = std::time::Instant::now();
        let err = client.fetch("Ankara").await.unwrap_err();
        let elapsed = started.elapsed();
        server.abort();

        match err {
            FetchError::Transport { source, .. } => assert!(source.is_timeout()),
            other => panic!("expected a transport error, got {other:?}"),
        }
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");
    }
}
