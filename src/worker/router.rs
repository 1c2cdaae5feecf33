//! Fetch routing: classification, strategy selection and offline fallbacks.

use super::classify::{classify, RequestClass};
use super::http::{FetchRequest, Network, Response};
use super::strategy::{self, Strategy, StrategyOutcome};
use crate::config::{CacheNames, WorkerConfig};
use crate::storage::CacheStore;
use futures_util::future::LocalBoxFuture;

/// What to do when the chosen strategy produced nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fallback {
    /// Serve the cached document shell, else a 503 with this text.
    OfflinePage(String),
    /// Synthesize a plain-text response.
    Synthesized { status: u16, text: String },
    /// No synthesized answer; the request fails as a network error.
    NetworkError,
}

/// Strategy, target cache and fallback for one request class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub strategy: Strategy,
    pub cache_name: String,
    pub fallback: Fallback,
}

/// A request the worker answered.
pub struct HandledFetch {
    pub class: RequestClass,
    /// `None` means the request fails with a network error.
    pub response: Option<Response>,
    pub revalidation: Option<LocalBoxFuture<'static, ()>>,
}

/// Routes intercepted requests for one deployment.
#[derive(Clone)]
pub struct FetchRouter<S, N> {
    config: WorkerConfig,
    names: CacheNames,
    store: S,
    network: N,
}

impl<S, N> FetchRouter<S, N>
where
    S: CacheStore + Clone + 'static,
    N: Network + Clone + 'static,
{
    pub fn new(config: WorkerConfig, store: S, network: N) -> Self {
        let names = config.cache_names();
        Self {
            config,
            names,
            store,
            network,
        }
    }

    /// Classifies a request. `None` means the worker must not intercept it.
    pub fn classify(&self, request: &FetchRequest) -> Option<RequestClass> {
        let class = classify(request, &self.config.bypass_hosts);
        if class.is_none() {
            log::debug!("Passing through {}", request.url);
        }
        class
    }

    /// The route taken by a request class.
    pub fn route_for(&self, class: RequestClass) -> Route {
        let names = &self.names;
        let config = &self.config;
        match class {
            RequestClass::NavigateHtml => Route {
                strategy: Strategy::NetworkFirst,
                cache_name: names.runtime.clone(),
                fallback: Fallback::OfflinePage(config.page_unavailable_text.clone()),
            },
            RequestClass::StaticAsset => Route {
                strategy: Strategy::StaleWhileRevalidate,
                cache_name: names.resources.clone(),
                fallback: Fallback::NetworkError,
            },
            RequestClass::Image => Route {
                strategy: Strategy::CacheFirst,
                cache_name: names.resources.clone(),
                fallback: Fallback::Synthesized {
                    status: 404,
                    text: String::new(),
                },
            },
            RequestClass::GeoData => Route {
                strategy: Strategy::NetworkFirst,
                cache_name: names.geo.clone(),
                fallback: Fallback::NetworkError,
            },
            RequestClass::TileOrApi => Route {
                strategy: Strategy::NetworkFirst,
                cache_name: names.api.clone(),
                fallback: Fallback::Synthesized {
                    status: 503,
                    text: config.resource_unavailable_text.clone(),
                },
            },
            RequestClass::Default => Route {
                strategy: Strategy::NetworkFirst,
                cache_name: names.runtime.clone(),
                fallback: Fallback::Synthesized {
                    status: 503,
                    text: config.offline_text.clone(),
                },
            },
        }
    }

    /// Answers an already classified request.
    pub async fn respond(&self, class: RequestClass, request: &FetchRequest) -> HandledFetch {
        let route = self.route_for(class);
        let StrategyOutcome {
            response,
            revalidation,
        } = strategy::run(
            route.strategy,
            &self.store,
            &self.network,
            request,
            &route.cache_name,
        )
        .await;

        let response = match response {
            Some(response) => Some(response),
            None => self.fallback(&route.fallback, request).await,
        };

        HandledFetch {
            class,
            response,
            revalidation,
        }
    }

    /// Classifies and answers a request. `None` means pass-through.
    pub async fn handle(&self, request: &FetchRequest) -> Option<HandledFetch> {
        let class = self.classify(request)?;
        Some(self.respond(class, request).await)
    }

    async fn fallback(&self, fallback: &Fallback, request: &FetchRequest) -> Option<Response> {
        match fallback {
            Fallback::OfflinePage(text) => {
                let shell = FetchRequest::get(self.config.offline_page.as_str());
                match strategy::cached(&self.store, &shell).await {
                    Some(page) => {
                        log::info!("Serving offline page for {}", request.url);
                        Some(page)
                    }
                    None => Some(Response::text(503, text)),
                }
            }
            Fallback::Synthesized { status, text } => {
                log::info!("Synthesizing {} for {}", status, request.url);
                Some(Response::text(*status, text))
            }
            Fallback::NetworkError => {
                log::warn!("No network or cached response for {}", request.url);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{CacheHandle, MemoryCacheStore};
    use crate::worker::strategy::testing::MockNetwork;
    use chrono::NaiveDate;
    use pollster::block_on;

    fn router() -> (FetchRouter<MemoryCacheStore, MockNetwork>, MemoryCacheStore, MockNetwork) {
        let store = MemoryCacheStore::new();
        let network = MockNetwork::new();
        let config = WorkerConfig::new("sig-louga-v2")
            .with_deployed_on(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        (
            FetchRouter::new(config, store.clone(), network.clone()),
            store,
            network,
        )
    }

    #[test]
    fn test_route_table() {
        let (router, _, _) = router();
        let route = router.route_for(RequestClass::StaticAsset);
        assert_eq!(route.strategy, Strategy::StaleWhileRevalidate);
        assert_eq!(route.cache_name, "sig-louga-v2-resources");

        let route = router.route_for(RequestClass::Image);
        assert_eq!(route.strategy, Strategy::CacheFirst);
        assert_eq!(route.cache_name, "sig-louga-v2-resources");

        assert_eq!(
            router.route_for(RequestClass::GeoData).cache_name,
            "sig-louga-v2-geolocation"
        );
        assert_eq!(
            router.route_for(RequestClass::TileOrApi).cache_name,
            "sig-louga-v2-api"
        );
        assert_eq!(
            router.route_for(RequestClass::NavigateHtml).cache_name,
            "sig-louga-v2-runtime"
        );
    }

    #[test]
    fn test_bypassed_requests_are_not_handled() {
        let (router, _, network) = router();
        let request = FetchRequest::get("https://www.google-analytics.com/analytics.js");
        assert!(block_on(router.handle(&request)).is_none());
        assert_eq!(network.call_count(), 0);
    }

    #[test]
    fn test_offline_navigation_serves_cached_shell() {
        let (router, store, network) = router();
        let main = block_on(store.open("sig-louga-v2-2024-05-01")).unwrap();
        block_on(main.put(
            &FetchRequest::get("./index.html"),
            Response::new(200, "<html>shell</html>"),
        ))
        .unwrap();
        network.set_offline(true);

        let handled = block_on(router.handle(&FetchRequest::navigate(
            "https://sig.example.sn/?layer=routes",
        )))
        .unwrap();
        assert_eq!(handled.class, RequestClass::NavigateHtml);
        assert_eq!(handled.response.unwrap().body_text(), "<html>shell</html>");
    }

    #[test]
    fn test_offline_navigation_without_shell_is_503() {
        let (router, _, network) = router();
        network.set_offline(true);

        let handled =
            block_on(router.handle(&FetchRequest::navigate("https://sig.example.sn/"))).unwrap();
        let response = handled.response.unwrap();
        assert_eq!(response.status, 503);
        assert_eq!(
            response.body_text(),
            "Page non disponible. Vérifiez votre connexion."
        );
    }

    #[test]
    fn test_missing_image_is_empty_404() {
        let (router, _, network) = router();
        network.set_offline(true);

        let handled = block_on(router.handle(&FetchRequest::get(
            "https://sig.example.sn/icons/legend.png",
        )))
        .unwrap();
        let response = handled.response.unwrap();
        assert_eq!(response.status, 404);
        assert!(response.body.is_empty());
    }

    #[test]
    fn test_offline_geo_data_without_cache_is_network_error() {
        let (router, _, network) = router();
        network.set_offline(true);

        let handled = block_on(router.handle(&FetchRequest::get(
            "https://sig.example.sn/data/routes.geojson",
        )))
        .unwrap();
        assert_eq!(handled.class, RequestClass::GeoData);
        assert!(handled.response.is_none());
    }

    #[test]
    fn test_offline_api_and_default_fallbacks() {
        let (router, _, network) = router();
        network.set_offline(true);

        let api = block_on(router.handle(&FetchRequest::get(
            "https://nominatim.openstreetmap.org/search?q=Louga",
        )))
        .unwrap()
        .response
        .unwrap();
        assert_eq!(api.status, 503);
        assert_eq!(api.body_text(), "Ressource non disponible hors-ligne");

        let other = block_on(router.handle(&FetchRequest::get(
            "https://sig.example.sn/manifest.json",
        )))
        .unwrap()
        .response
        .unwrap();
        assert_eq!(other.status, 503);
        assert_eq!(other.body_text(), "Offline");
    }

    #[test]
    fn test_api_responses_are_cached_for_offline_use() {
        let (router, store, network) = router();
        let url = "https://server.example.com/tiles/10/20/30";
        network.serve(url, Response::new(200, "tile"));
        let request = FetchRequest::get(url);

        block_on(router.handle(&request)).unwrap();
        assert_eq!(store.entry_count("sig-louga-v2-api"), Some(1));

        network.set_offline(true);
        let handled = block_on(router.handle(&request)).unwrap();
        assert_eq!(handled.response.unwrap().body_text(), "tile");
    }

    #[test]
    fn test_post_response_never_answers_offline_get() {
        let (router, store, network) = router();
        let url = "https://sig.example.sn/submit";
        network.serve(url, Response::new(200, "POST RESULT"));

        let posted = block_on(router.handle(&FetchRequest::new("POST", url))).unwrap();
        assert_eq!(posted.class, RequestClass::Default);
        assert_eq!(posted.response.unwrap().body_text(), "POST RESULT");
        assert_eq!(store.entry_count("sig-louga-v2-runtime").unwrap_or(0), 0);

        network.set_offline(true);
        let response = block_on(router.handle(&FetchRequest::get(url)))
            .unwrap()
            .response
            .unwrap();
        assert_eq!(response.status, 503);
        assert_eq!(response.body_text(), "Offline");
    }
}
