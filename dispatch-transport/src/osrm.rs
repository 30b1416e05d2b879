use anyhow::bail;
use log::debug;
use serde::Deserialize;

use dispatch_logic::{Location, RoutePath, RoutingService, prelude::*};

const fn router_host() -> &'static str {
    if let Some(host) = option_env!("ROUTER_HOST") {
        host
    } else {
        "router.project-osrm.org"
    }
}

const fn router_secure() -> bool {
    if let Some(secure) = option_env!("ROUTER_SECURE") {
        const_str::eq_ignore_ascii_case!(secure, "true") || const_str::equal!(secure, "1")
    } else {
        true
    }
}

const fn router_profile() -> &'static str {
    if let Some(profile) = option_env!("ROUTER_PROFILE") {
        profile
    } else {
        "driving"
    }
}

const fn router_proto() -> &'static str {
    if router_secure() { "https" } else { "http" }
}

const ROUTER_HOST: &str = router_host();
const ROUTER_PROTO: &str = router_proto();
const ROUTER_PROFILE: &str = router_profile();

const ROUTER_URL: &str = const_str::concat!(ROUTER_PROTO, "://", ROUTER_HOST);

/// OSRM wants `long,lat` pairs separated by `;`
pub fn route_url(base_url: &str, profile: &str, waypoints: &[Location]) -> String {
    let coords = waypoints
        .iter()
        .map(|w| format!("{},{}", w.long, w.lat))
        .collect::<Vec<_>>()
        .join(";");
    format!("{base_url}/route/v1/{profile}/{coords}?overview=full&geometries=geojson")
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
    geometry: OsrmGeometry,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    /// `[long, lat]` pairs
    coordinates: Vec<[f64; 2]>,
}

impl OsrmResponse {
    fn into_path(self) -> Result<RoutePath> {
        if self.code != "Ok" {
            bail!(
                "Router answered {}: {}",
                self.code,
                self.message.as_deref().unwrap_or("no details")
            );
        }

        let route = self
            .routes
            .into_iter()
            .next()
            .context("Router returned no routes")?;

        Ok(RoutePath {
            points: route
                .geometry
                .coordinates
                .into_iter()
                .map(|[long, lat]| Location::new(lat, long))
                .collect(),
            distance_meters: route.distance,
            duration_seconds: route.duration,
        })
    }
}

/// [RoutingService] backed by an OSRM HTTP server
pub struct OsrmRouter {
    client: reqwest::Client,
    base_url: String,
    profile: String,
}

impl OsrmRouter {
    /// Router using the compile time configured server
    pub fn new() -> Result<Self> {
        Self::with_server(ROUTER_URL, ROUTER_PROFILE)
    }

    pub fn with_server(base_url: impl Into<String>, profile: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("dispatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            profile: profile.into(),
        })
    }
}

impl RoutingService for OsrmRouter {
    async fn compute_route(&self, waypoints: Vec<Location>) -> Result<RoutePath> {
        if waypoints.len() < 2 {
            bail!("Need an origin and at least one stop to route");
        }

        let url = route_url(&self.base_url, &self.profile, &waypoints);
        debug!("Requesting {url}");

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .context("Could not reach the router")?;

        // OSRM explains failures (NoRoute etc) in a JSON body alongside a 4xx status
        let status = resp.status();
        let body = resp
            .json::<OsrmResponse>()
            .await
            .with_context(|| format!("Router answered {status} with an unreadable body"))?;

        body.into_path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_url() {
        let url = route_url(
            "https://router.example",
            "driving",
            &[Location::new(29.07, 80.1), Location::new(29.08, 80.12)],
        );
        assert_eq!(
            url,
            "https://router.example/route/v1/driving/80.1,29.07;80.12,29.08?overview=full&geometries=geojson"
        );
    }

    #[test]
    fn test_parse_route() {
        let raw = r#"{
            "code": "Ok",
            "routes": [{
                "distance": 1523.4,
                "duration": 210.9,
                "geometry": {"type": "LineString", "coordinates": [[80.1, 29.07], [80.12, 29.08]]}
            }],
            "waypoints": []
        }"#;
        let resp = serde_json::from_str::<OsrmResponse>(raw).expect("Failed to parse");
        let path = resp.into_path().expect("Route rejected");
        assert_eq!(
            path.points,
            vec![Location::new(29.07, 80.1), Location::new(29.08, 80.12)]
        );
        assert_eq!(path.distance_meters, 1523.4);
        assert_eq!(path.duration_seconds, 210.9);
    }

    #[test]
    fn test_parse_no_route() {
        let raw = r#"{"code": "NoRoute", "message": "Impossible route between points"}"#;
        let resp = serde_json::from_str::<OsrmResponse>(raw).expect("Failed to parse");
        let err = resp.into_path().expect_err("NoRoute accepted");
        assert!(err.to_string().contains("NoRoute"));
    }

    #[tokio::test]
    async fn test_too_few_waypoints() {
        let router = OsrmRouter::with_server("http://127.0.0.1:9", "driving").expect("client");
        let res = router.compute_route(vec![Location::new(29.0, 80.0)]).await;
        assert!(res.is_err());
    }
}
