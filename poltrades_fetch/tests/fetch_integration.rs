use poltrades_fetch::{HttpFetcher, PageFetcher, MIN_ROW_CELLS};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Wrap an RSC payload string in the script chunk the fetcher decodes.
fn page_html(payload: &str) -> String {
    let escaped = serde_json::to_string(payload).unwrap();
    format!(
        "<html><body><script>self.__next_f.push([1,{}])</script></body></html>",
        escaped
    )
}

fn trades_payload() -> &'static str {
    r#"{"trades":{"data":[
        {"_txId":1001,"pubDate":"2024-02-10T05:00:00Z","txDate":"2024-02-01",
         "reportingGap":9,"txType":"buy","sizeRangeLow":1001,"sizeRangeHigh":15000,
         "issuer":{"issuerName":"Apple Inc","issuerTicker":"AAPL:US"}},
        {"_txId":1002,"pubDate":"2024-02-09","txDate":"2024-01-28",
         "reportingGap":12,"txType":"sell","sizeRangeLow":null,"sizeRangeHigh":1000,
         "issuer":{"issuerName":"Microsoft Corp","issuerTicker":"MSFT:US"}}
    ]}}"#
}

#[tokio::test]
async fn fetch_page_returns_rows_in_listing_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/politicians/P000197"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page_html(trades_payload())))
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::with_base_url(&server.uri()).unwrap();
    let rows = fetcher.fetch_page("P000197", 1).await.unwrap().unwrap();

    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row.len() >= MIN_ROW_CELLS));
    assert_eq!(rows[0][1], "AAPL");
    assert_eq!(rows[0][3], "1 Feb 2024");
    assert_eq!(rows[0][5], "buy");
    assert_eq!(rows[0][6], "1K\u{2013}15K");
    assert_eq!(rows[1][1], "MSFT");
    assert_eq!(rows[1][6], "< 1K");
}

#[tokio::test]
async fn fetch_page_passes_page_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/politicians/P000197"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page_html(trades_payload())))
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::with_base_url(&server.uri()).unwrap();
    let rows = fetcher.fetch_page("P000197", 2).await.unwrap();
    assert!(rows.is_some());
}

#[tokio::test]
async fn fetch_page_without_trade_table_is_end_of_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/politicians/P000197"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(page_html(r#"{"header":{"data":[{"name":"x"}]}}"#)),
        )
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::with_base_url(&server.uri()).unwrap();
    let rows = fetcher.fetch_page("P000197", 7).await.unwrap();
    assert!(rows.is_none());
}

#[tokio::test]
async fn fetch_page_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/politicians/P000197"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::with_base_url(&server.uri()).unwrap();
    let err = fetcher.fetch_page("P000197", 1).await.unwrap_err();
    assert!(err.to_string().contains("500"));
}
