//! Network-backed stages against a mock HTTP server
//!
//! Each source gets one attempt; every failure mode must end in the fallback.


use mock_sources::{chart_png, prediction};
use serde_json::json;
use smc_signal::{
    classifier::{classify_or_fallback, combine},
    config::MarketDataConfig,
    AnalysisPipeline, AnalysisRequest, Bias, ChartClassifier, ChartPreprocessor, ChartUpload,
    MarketDataFetcher, PredictionSource, PriceSource, QuoteProvider, RemoteChartClassifier,
    SignalError, TwelveDataClient,
};
use tokio_test::{assert_err, assert_ok};
use rand::rngs::mock::StepRng;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn market_config(base_url: &str, api_key: Option<&str>) -> MarketDataConfig {
    MarketDataConfig {
        api_key: api_key.map(str::to_string),
        base_url: base_url.to_string(),
        timeout_secs: 2,
    }
}

fn fetcher(server: &MockServer) -> MarketDataFetcher {
    let client = TwelveDataClient::new(&market_config(&server.uri(), Some("test-key"))).unwrap();
    MarketDataFetcher::new(Arc::new(client), Duration::from_secs(2))
}

#[tokio::test]
async fn test_live_price_uses_provider_pair_notation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/price"))
        .and(query_param("symbol", "EUR/USD"))
        .and(query_param("apikey", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "price": "1.08310" })))
        .mount(&server)
        .await;

    let price = fetcher(&server).get_live_price("eur/usd").await;

    assert_eq!(price.symbol, "EURUSD");
    assert_eq!(price.price, 1.0831);
    assert_eq!(price.source, PriceSource::Live);
}

#[tokio::test]
async fn test_provider_error_status_serves_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/price"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let price = fetcher(&server).get_live_price("EURUSD").await;

    assert_eq!(price.price, 1.0742);
    assert_eq!(price.source, PriceSource::Simulated);
}

#[tokio::test]
async fn test_provider_failures_surface_as_price_feed_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/price"))
        .and(query_param("symbol", "USD/JPY"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "price": "148.90" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/price"))
        .and(query_param("symbol", "EUR/USD"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = TwelveDataClient::new(&market_config(&server.uri(), Some("test-key"))).unwrap();
    assert_eq!(assert_ok!(client.quote("USDJPY").await), 148.9);

    let err = assert_err!(client.quote("EURUSD").await);
    assert!(matches!(err, SignalError::PriceFeed(ref msg) if msg.contains("500")), "{:?}", err);

    let keyless = TwelveDataClient::new(&market_config(&server.uri(), None)).unwrap();
    let err = assert_err!(keyless.quote("EURUSD").await);
    assert!(matches!(err, SignalError::PriceFeed(_)));
}

#[tokio::test]
async fn test_provider_error_body_serves_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/price"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "code": 400, "message": "symbol not found", "status": "error" })),
        )
        .mount(&server)
        .await;

    let price = fetcher(&server).get_live_price("NAS100").await;

    assert_eq!(price.price, 1.0);
    assert_eq!(price.source, PriceSource::Simulated);
}

#[tokio::test]
async fn test_slow_provider_times_out_to_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/price"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "price": "1.5" }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let client = TwelveDataClient::new(&market_config(&server.uri(), Some("test-key"))).unwrap();
    let fetcher = MarketDataFetcher::new(Arc::new(client), Duration::from_millis(200));
    let price = fetcher.get_live_price("GBPUSD").await;

    assert_eq!(price.price, 1.2985);
    assert_eq!(price.source, PriceSource::Simulated);
}

#[tokio::test]
async fn test_missing_api_key_never_calls_provider() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "price": "9.9" })))
        .expect(0)
        .mount(&server)
        .await;

    let fetcher = MarketDataFetcher::from_config(&market_config(&server.uri(), None));
    let price = fetcher.get_live_price("XAUUSD").await;

    assert_eq!(price.price, 2685.5);
    assert_eq!(price.source, PriceSource::Simulated);
}

#[tokio::test]
async fn test_remote_classifier_success_is_marked_remote() {
    let server = MockServer::start().await;
    let body = combine(
        prediction(Bias::Bearish, 0.9),
        prediction(Bias::Bearish, 0.8),
        PredictionSource::Local,
    );
    Mock::given(method("POST"))
        .and(path("/classify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .expect(1)
        .mount(&server)
        .await;

    let classifier =
        RemoteChartClassifier::new(format!("{}/classify", server.uri()), Duration::from_secs(2)).unwrap();
    let result = classifier
        .analyze_charts(&chart_png(32, 32), &chart_png(32, 32))
        .await
        .unwrap();

    assert_eq!(result.combined_signal, Bias::Bearish);
    assert_eq!(result.source, PredictionSource::Remote);
    assert!((result.overall_confidence - 0.86).abs() < 1e-9);
}

#[tokio::test]
async fn test_remote_classifier_failure_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let classifier = RemoteChartClassifier::new(server.uri(), Duration::from_secs(2)).unwrap();

    let err = assert_err!(classifier.analyze_charts(b"a", b"b").await);
    assert!(matches!(err, SignalError::Classifier(_)));

    let mut rng = StepRng::new(0, 0);
    let fallback = classify_or_fallback(&classifier, b"a", b"b", &mut rng).await;
    assert_eq!(fallback.source, PredictionSource::Fallback);
    assert_eq!(fallback.overall_confidence, 0.75);
}

#[tokio::test]
async fn test_pipeline_with_both_sources_down() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let classifier = RemoteChartClassifier::new(server.uri(), Duration::from_secs(2)).unwrap();
    let pipeline = AnalysisPipeline::new(
        ChartPreprocessor::new(Default::default()),
        Arc::new(classifier),
        fetcher(&server),
    );

    let result = pipeline
        .analyze(AnalysisRequest {
            higher: Some(ChartUpload::new("ethusd_h4.png", chart_png(200, 120))),
            lower: Some(ChartUpload::new("ethusd_m15.png", chart_png(200, 120))),
        })
        .await
        .unwrap();

    assert_eq!(result.prediction.source, PredictionSource::Fallback);
    assert_eq!(result.signal.provenance.price, PriceSource::Simulated);
    assert_eq!(result.signal.live_price, 3520.0);
    assert!((0.0..=100.0).contains(&result.signal.confidence));
}
