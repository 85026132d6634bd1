use snapshot::{BuildId, PriceRecord};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use venue_steam::{FetchError, MetadataSource, SteamClient, SteamConfig};

const INFO_BODY: &str = r#"{
    "data": {
        "753640": {
            "common": { "name": "Outer Wilds" },
            "depots": {
                "branches": {
                    "public": { "buildid": "100", "timeupdated": "1700000000" },
                    "experimental": { "buildid": "101", "timeupdated": "1700000100", "pwdrequired": "1" }
                }
            }
        }
    },
    "status": "success"
}"#;

const PRICE_BODY: &str = r#"{
    "753640": {
        "success": true,
        "data": { "price_overview": { "currency": "USD", "initial": 2499, "final": 1999, "discount_percent": 20 } }
    }
}"#;

/// Serves canned JSON bodies keyed by request path prefix, one request per
/// connection.
async fn serve(routes: Vec<(&'static str, u16, &'static str)>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let routes = routes.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let mut read = 0;
                loop {
                    let n = stream.read(&mut buf[read..]).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    read += n;
                    if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") || read == buf.len() {
                        break;
                    }
                }
                let request = String::from_utf8_lossy(&buf[..read]);
                let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();

                let (status, body) = routes
                    .iter()
                    .find(|(prefix, _, _)| path.starts_with(prefix))
                    .map(|(_, status, body)| (*status, *body))
                    .unwrap_or((404, "{}"));
                let response = format!(
                    "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    format!("http://{addr}")
}

fn client(base: &str) -> SteamClient {
    SteamClient::new(SteamConfig {
        info_api: base.to_string(),
        store_api: base.to_string(),
        country: "us".into(),
    })
    .expect("client builds")
}

#[tokio::test]
async fn fetches_branches_and_price() {
    let base = serve(vec![
        ("/v1/info/753640", 200, INFO_BODY),
        ("/api/appdetails", 200, PRICE_BODY),
    ])
    .await;

    let metadata = client(&base).fetch(753640).await.expect("fetch succeeds");
    assert_eq!(metadata.name.as_deref(), Some("Outer Wilds"));
    assert_eq!(metadata.branches.len(), 2);
    assert_eq!(metadata.branches[0].name, "public");
    assert_eq!(metadata.branches[1].build_id, BuildId::new(101));
    assert!(metadata.branches[1].password_required);
    assert_eq!(metadata.price, Some(PriceRecord::new(2499, 1999, 20)));
}

#[tokio::test]
async fn server_error_fails_the_fetch() {
    let base = serve(vec![
        ("/v1/info/753640", 503, "{}"),
        ("/api/appdetails", 200, PRICE_BODY),
    ])
    .await;

    let err = client(&base).fetch(753640).await.expect_err("503 fails");
    assert!(matches!(err, FetchError::Status { status: 503, .. }));
}
