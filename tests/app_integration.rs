use equity_aggregator::core::config::AppConfig;
use equity_aggregator::core::equity::MatchEvidence;
use equity_aggregator::core::store::ProfileStore;
use equity_aggregator::store::FjallProfileStore;
use rust_decimal::Decimal;
use std::fs;
use std::str::FromStr;
use tracing::info;

mod test_utils {
    use serde_json::{Value, json};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub async fn mount_json(server: &MockServer, url_path: &str, body: Value) {
        Mock::given(method("GET"))
            .and(path(url_path))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    /// One server playing every vendor, the rate API and the ISIN lookup.
    pub async fn create_vendor_server() -> MockServer {
        let server = MockServer::start().await;

        mount_json(
            &server,
            "/euronext",
            json!([
                {"name": "Airbus SE", "symbol": "AIR", "isin": "NL0000235190",
                 "mics": ["XPAR"], "currency": "EUR", "last_price": "140,10"},
                {"name": "LVMH Moet Hennessy Louis Vuitton", "symbol": "MC", "isin": "FR0000121014",
                 "mics": ["XPAR"], "currency": "EUR", "last_price": "700.00"},
                {"name": "Broken Record", "symbol": "BRK", "isin": "FR0000121015",
                 "mics": ["XPAR"], "currency": "EUR"}
            ]),
        )
        .await;

        mount_json(
            &server,
            "/lse",
            json!({"data": [
                {"issuername": "Airbus SE", "tidm": "0KVV", "isin": "NL0000235190",
                 "currency": "GBX", "lastprice": "12000", "marketcapitalization": "9600000000000"},
                {"issuername": "Vodafone Group", "tidm": "VOD",
                 "currency": "GBP", "lastprice": "0.70"}
            ]}),
        )
        .await;

        mount_json(
            &server,
            "/xetra",
            json!([
                {"name": "Siemens AG", "wkn": "723610", "currency": "EUR",
                 "overview": {"lastPrice": "180,00"}}
            ]),
        )
        .await;

        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        mount_json(
            &server,
            "/rates/latest/USD",
            json!({"result": "success", "conversion_rates": {"USD": 1, "EUR": 0.5, "GBP": 0.8}}),
        )
        .await;

        // Unmatched lookups fall through to wiremock's default 404.
        Mock::given(method("GET"))
            .and(path("/isin"))
            .and(query_param("name", "SIEMENS AG"))
            .and(query_param("exchange", "XETR"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"isin": "DE0007236101"})))
            .mount(&server)
            .await;

        server
    }
}

fn write_config(dir: &std::path::Path, uri: &str) -> std::path::PathBuf {
    let config_path = dir.join("config.yaml");
    let config_content = format!(
        r#"
currency: "USD"
rates:
  base_url: "{uri}/rates"
feeds:
  - name: euronext
    url: "{uri}/euronext"
    schema: euronext
  - name: lse
    url: "{uri}/lse"
    schema: lse
  - name: xetra
    url: "{uri}/xetra"
    schema: xetra
  - name: broken
    url: "{uri}/broken"
lookup:
  url: "{uri}/isin"
source_priority: [euronext, xetra, lse]
data_path: "{}"
"#,
        dir.join("data").display()
    );
    fs::write(&config_path, config_content).expect("Failed to write config file");
    config_path
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

#[test_log::test(tokio::test)]
async fn test_full_app_flow_with_mock() {
    let server = test_utils::create_vendor_server().await;
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config_path = write_config(temp_dir.path(), &server.uri());

    let result = equity_aggregator::run_command(
        equity_aggregator::AppCommand::Aggregate { json: false },
        Some(config_path.to_str().unwrap()),
    )
    .await;
    assert!(
        result.is_ok(),
        "Aggregate command failed with: {:?}",
        result.err()
    );

    let config = AppConfig::load_from_path(&config_path).unwrap();
    let store = FjallProfileStore::open(&config.default_data_path().unwrap()).unwrap();
    let profiles = store.load_all().await.unwrap();
    info!(count = profiles.len(), "Loaded stored profiles");

    // Airbus, LVMH, Vodafone and Siemens; the bad-checksum record and the
    // broken feed contribute nothing.
    assert_eq!(profiles.len(), 4);

    let airbus = profiles
        .iter()
        .find(|p| p.isin.as_deref() == Some("NL0000235190"))
        .unwrap();
    assert_eq!(airbus.symbol, "AIR");
    assert_eq!(airbus.price, Some(dec("280.20")));
    assert_eq!(airbus.market_cap, Some(dec("120000000000.00")));
    assert_eq!(airbus.source_names(), vec!["euronext", "lse"]);

    let siemens = profiles
        .iter()
        .find(|p| p.isin.as_deref() == Some("DE0007236101"))
        .unwrap();
    assert_eq!(siemens.exchange, "XETR");
    assert_eq!(siemens.price, Some(dec("360.00")));

    let vodafone = profiles.iter().find(|p| p.symbol == "VOD").unwrap();
    assert!(vodafone.isin.is_none());
    assert_eq!(vodafone.sources[0].evidence, MatchEvidence::Unmatched);
    assert_eq!(vodafone.price, Some(dec("0.88")));

    let show = equity_aggregator::run_command(
        equity_aggregator::AppCommand::Show,
        Some(config_path.to_str().unwrap()),
    )
    .await;
    assert!(show.is_ok(), "Show command failed with: {:?}", show.err());
}

#[test_log::test(tokio::test)]
async fn test_rerun_replaces_stored_profiles() {
    let server = test_utils::create_vendor_server().await;
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config_path = write_config(temp_dir.path(), &server.uri());

    for _ in 0..2 {
        equity_aggregator::run_command(
            equity_aggregator::AppCommand::Aggregate { json: true },
            Some(config_path.to_str().unwrap()),
        )
        .await
        .unwrap();
    }

    let config = AppConfig::load_from_path(&config_path).unwrap();
    let store = FjallProfileStore::open(&config.default_data_path().unwrap()).unwrap();
    assert_eq!(store.load_all().await.unwrap().len(), 4);
}

#[test_log::test(tokio::test)]
async fn test_invalid_config_is_reported() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(
        &config_path,
        "aggregation:\n  similarity_threshold: 2.0\n",
    )
    .unwrap();

    let result = equity_aggregator::run_command(
        equity_aggregator::AppCommand::Aggregate { json: false },
        Some(config_path.to_str().unwrap()),
    )
    .await;
    assert!(result.is_err());
}
