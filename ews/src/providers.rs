//! HTTP forecast sources.
//!
//! One parser per provider maps its native payload into [`ParsedForecast`];
//! adding a provider means adding a source and its parser here.

use std::time::Duration;

use agritrace_common::{Coordinates, ForecastPoint};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{EwsError, EwsResult};
use crate::forecast::{ForecastSource, ParsedForecast};

const OPENWEATHER_URL: &str = "https://api.openweathermap.org/data/3.0/onecall";
const OPEN_METEO_URL: &str = "https://api.open-meteo.com/v1/forecast";
const USER_AGENT: &str = "agritrace-ews/0.1";

fn build_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .pool_max_idle_per_host(4)
        .timeout(timeout)
        .build()
}

async fn get_json(
    client: &reqwest::Client,
    provider: &str,
    url: &str,
    query: &[(&str, String)],
) -> EwsResult<Value> {
    let failed = |reason: String| EwsError::ProviderFetchFailed {
        provider: provider.to_string(),
        reason,
    };

    let resp = client
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|e| failed(format!("HTTP error: {e}")))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(200).collect();
        return Err(failed(format!("HTTP status {status}: {snippet}")));
    }

    resp.json()
        .await
        .map_err(|e| failed(format!("JSON parse error: {e}")))
}

fn invalid(provider: &str, reason: impl Into<String>) -> EwsError {
    EwsError::InvalidPayload {
        provider: provider.to_string(),
        reason: reason.into(),
    }
}

// --- OpenWeather One Call ---------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct OneCallResponse {
    #[serde(default)]
    pub current: Option<OneCallCurrent>,
    #[serde(default)]
    pub daily: Vec<OneCallDaily>,
}

#[derive(Debug, Deserialize)]
pub struct OneCallCurrent {
    pub dt: i64,
    pub temp: f64,
    #[serde(default)]
    pub humidity: f64,
    #[serde(default)]
    pub wind_speed: f64,
    #[serde(default)]
    pub rain: Option<HourlyVolume>,
}

#[derive(Debug, Deserialize)]
pub struct HourlyVolume {
    #[serde(rename = "1h", default)]
    pub one_hour: f64,
}

#[derive(Debug, Deserialize)]
pub struct OneCallDaily {
    pub dt: i64,
    pub temp: DailyTemp,
    #[serde(default)]
    pub humidity: f64,
    #[serde(default)]
    pub wind_speed: f64,
    /// Daily rain volume in mm; absent on dry days.
    #[serde(default)]
    pub rain: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct DailyTemp {
    pub day: f64,
}

/// Map a One Call response (metric units) into forecast points.
pub fn parse_openweather(body: &Value) -> EwsResult<ParsedForecast> {
    let provider = OpenWeatherSource::NAME;
    let response: OneCallResponse =
        serde_json::from_value(body.clone()).map_err(|e| invalid(provider, e.to_string()))?;

    let timestamp = |dt: i64| {
        DateTime::<Utc>::from_timestamp(dt, 0)
            .ok_or_else(|| invalid(provider, format!("timestamp {dt} out of range")))
    };

    let current = response
        .current
        .map(|c| -> EwsResult<ForecastPoint> {
            Ok(ForecastPoint::new(
                timestamp(c.dt)?,
                c.temp,
                c.rain.map(|r| r.one_hour).unwrap_or(0.0),
                c.wind_speed,
                c.humidity,
            ))
        })
        .transpose()?;

    let daily = response
        .daily
        .into_iter()
        .map(|d| -> EwsResult<ForecastPoint> {
            Ok(ForecastPoint::new(
                timestamp(d.dt)?,
                d.temp.day,
                d.rain.unwrap_or(0.0),
                d.wind_speed,
                d.humidity,
            ))
        })
        .collect::<EwsResult<Vec<_>>>()?;

    Ok(ParsedForecast { current, daily })
}

/// OpenWeather One Call 3.0 source.
#[derive(Debug, Clone)]
pub struct OpenWeatherSource {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenWeatherSource {
    pub const NAME: &'static str = "openweather";

    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_client(timeout)?,
            api_key: api_key.into(),
            base_url: OPENWEATHER_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl ForecastSource for OpenWeatherSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn fetch_raw(&self, coords: Coordinates) -> EwsResult<Value> {
        debug!(lat = coords.lat, lon = coords.lon, "Fetching OpenWeather forecast");
        let query = [
            ("lat", coords.lat.to_string()),
            ("lon", coords.lon.to_string()),
            ("exclude", "minutely,hourly,alerts".to_string()),
            ("units", "metric".to_string()),
            ("appid", self.api_key.clone()),
        ];
        get_json(&self.client, Self::NAME, &self.base_url, &query).await
    }

    fn parse(&self, body: &Value) -> EwsResult<ParsedForecast> {
        parse_openweather(body)
    }
}

// --- Open-Meteo ---------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct OpenMeteoResponse {
    #[serde(default)]
    pub current: Option<OpenMeteoCurrent>,
    pub daily: OpenMeteoDaily,
}

#[derive(Debug, Deserialize)]
pub struct OpenMeteoCurrent {
    pub time: String,
    pub temperature_2m: f64,
    #[serde(default)]
    pub relative_humidity_2m: f64,
    #[serde(default)]
    pub precipitation: f64,
    #[serde(default)]
    pub wind_speed_10m: f64,
}

/// Column-oriented daily series; every array is indexed by `time`.
#[derive(Debug, Deserialize)]
pub struct OpenMeteoDaily {
    pub time: Vec<String>,
    pub temperature_2m_max: Vec<Option<f64>>,
    pub temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    pub precipitation_sum: Vec<Option<f64>>,
    #[serde(default)]
    pub wind_speed_10m_max: Vec<Option<f64>>,
    #[serde(default)]
    pub relative_humidity_2m_mean: Vec<Option<f64>>,
}

/// Map an Open-Meteo response (wind in m/s) into forecast points.
///
/// Daily temperature is the midpoint of the day's min and max. Days without
/// a temperature are skipped.
pub fn parse_open_meteo(body: &Value) -> EwsResult<ParsedForecast> {
    let provider = OpenMeteoSource::NAME;
    let response: OpenMeteoResponse =
        serde_json::from_value(body.clone()).map_err(|e| invalid(provider, e.to_string()))?;

    let current = response
        .current
        .map(|c| -> EwsResult<ForecastPoint> {
            let time = NaiveDateTime::parse_from_str(&c.time, "%Y-%m-%dT%H:%M")
                .map_err(|e| invalid(provider, format!("current time '{}': {e}", c.time)))?;
            Ok(ForecastPoint::new(
                Utc.from_utc_datetime(&time),
                c.temperature_2m,
                c.precipitation,
                c.wind_speed_10m,
                c.relative_humidity_2m,
            ))
        })
        .transpose()?;

    let daily = &response.daily;
    let column = |values: &[Option<f64>], i: usize| values.get(i).copied().flatten();

    let mut points = Vec::with_capacity(daily.time.len());
    for (i, day) in daily.time.iter().enumerate() {
        let date = NaiveDate::parse_from_str(day, "%Y-%m-%d")
            .map_err(|e| invalid(provider, format!("daily time '{day}': {e}")))?;
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| invalid(provider, format!("daily time '{day}'")))?;

        let (Some(max), Some(min)) = (
            column(&daily.temperature_2m_max, i),
            column(&daily.temperature_2m_min, i),
        ) else {
            continue;
        };

        points.push(ForecastPoint::new(
            Utc.from_utc_datetime(&midnight),
            (max + min) / 2.0,
            column(&daily.precipitation_sum, i).unwrap_or(0.0),
            column(&daily.wind_speed_10m_max, i).unwrap_or(0.0),
            column(&daily.relative_humidity_2m_mean, i).unwrap_or(0.0),
        ));
    }

    Ok(ParsedForecast {
        current,
        daily: points,
    })
}

/// Open-Meteo source. Needs no API key.
#[derive(Debug, Clone)]
pub struct OpenMeteoSource {
    client: reqwest::Client,
    base_url: String,
}

impl OpenMeteoSource {
    pub const NAME: &'static str = "open-meteo";

    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: OPEN_METEO_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl ForecastSource for OpenMeteoSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn fetch_raw(&self, coords: Coordinates) -> EwsResult<Value> {
        debug!(lat = coords.lat, lon = coords.lon, "Fetching Open-Meteo forecast");
        let query = [
            ("latitude", coords.lat.to_string()),
            ("longitude", coords.lon.to_string()),
            (
                "daily",
                "temperature_2m_max,temperature_2m_min,precipitation_sum,wind_speed_10m_max,relative_humidity_2m_mean"
                    .to_string(),
            ),
            (
                "current",
                "temperature_2m,relative_humidity_2m,precipitation,wind_speed_10m".to_string(),
            ),
            ("wind_speed_unit", "ms".to_string()),
            ("timezone", "UTC".to_string()),
            ("forecast_days", "7".to_string()),
        ];
        get_json(&self.client, Self::NAME, &self.base_url, &query).await
    }

    fn parse(&self, body: &Value) -> EwsResult<ParsedForecast> {
        parse_open_meteo(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_openweather() {
        let body = json!({
            "lat": -1.29,
            "lon": 36.82,
            "current": {
                "dt": 1_700_000_000,
                "temp": 24.5,
                "humidity": 71,
                "wind_speed": 3.6,
                "rain": { "1h": 0.4 }
            },
            "daily": [
                { "dt": 1_700_006_400, "temp": { "day": 26.1, "min": 15.0, "max": 27.3 },
                  "humidity": 65, "wind_speed": 4.2, "rain": 2.5 },
                { "dt": 1_700_092_800, "temp": { "day": 27.0, "min": 16.0, "max": 28.0 },
                  "humidity": 60, "wind_speed": 5.0 }
            ]
        });

        let parsed = parse_openweather(&body).unwrap();
        let current = parsed.current.unwrap();
        assert_eq!(current.temperature, 24.5);
        assert_eq!(current.precipitation, 0.4);
        assert_eq!(current.humidity, 71.0);
        assert_eq!(current.timestamp.timestamp(), 1_700_000_000);

        assert_eq!(parsed.daily.len(), 2);
        assert_eq!(parsed.daily[0].temperature, 26.1);
        assert_eq!(parsed.daily[0].precipitation, 2.5);
        assert_eq!(parsed.daily[1].precipitation, 0.0);
        assert_eq!(parsed.daily[1].wind_speed, 5.0);
    }

    #[test]
    fn test_parse_openweather_rejects_wrong_shape() {
        let body = json!({ "daily": [{ "dt": 1, "temp": 20.0 }] });
        assert!(matches!(
            parse_openweather(&body),
            Err(EwsError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn test_parse_open_meteo() {
        let body = json!({
            "latitude": 0.35,
            "longitude": 32.58,
            "current": {
                "time": "2024-03-01T12:00",
                "temperature_2m": 27.4,
                "relative_humidity_2m": 58,
                "precipitation": 0.0,
                "wind_speed_10m": 2.9
            },
            "daily": {
                "time": ["2024-03-01", "2024-03-02", "2024-03-03"],
                "temperature_2m_max": [29.0, 30.0, null],
                "temperature_2m_min": [17.0, 18.0, 16.0],
                "precipitation_sum": [0.0, 12.5, 3.0],
                "wind_speed_10m_max": [4.0, 21.5, 6.0],
                "relative_humidity_2m_mean": [60, 84, 70]
            }
        });

        let parsed = parse_open_meteo(&body).unwrap();
        let current = parsed.current.unwrap();
        assert_eq!(current.temperature, 27.4);
        assert_eq!(current.timestamp.to_rfc3339(), "2024-03-01T12:00:00+00:00");

        // The third day has no max temperature and is skipped.
        assert_eq!(parsed.daily.len(), 2);
        assert_eq!(parsed.daily[0].temperature, 23.0);
        assert_eq!(parsed.daily[1].precipitation, 12.5);
        assert_eq!(parsed.daily[1].wind_speed, 21.5);
        assert_eq!(parsed.daily[1].humidity, 84.0);
    }

    #[test]
    fn test_parse_open_meteo_without_current() {
        let body = json!({
            "daily": {
                "time": ["2024-03-01"],
                "temperature_2m_max": [20.0],
                "temperature_2m_min": [10.0]
            }
        });

        let parsed = parse_open_meteo(&body).unwrap();
        assert!(parsed.current.is_none());
        assert_eq!(parsed.daily[0].precipitation, 0.0);
    }

    #[test]
    fn test_source_names() {
        let open_meteo = OpenMeteoSource::new(Duration::from_secs(10)).unwrap();
        assert_eq!(open_meteo.name(), "open-meteo");

        let openweather = OpenWeatherSource::new("key", Duration::from_secs(10)).unwrap();
        assert_eq!(openweather.name(), "openweather");
    }
}
