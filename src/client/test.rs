use super::*;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Spawn a listener that answers each request line with the next canned reply
/// and returns the lines it received.
async fn spawn_canned_server(
    replies: Vec<&'static str>,
) -> (std::net::SocketAddr, tokio::task::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut writer) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        let mut received = Vec::new();

        for reply in replies {
            match lines.next_line().await.unwrap() {
                Some(line) => received.push(line),
                None => break,
            }
            writer.write_all(reply.as_bytes()).await.unwrap();
        }
        received
    });

    (addr, task)
}

#[tokio::test]
async fn test_requests_are_encoded_one_per_line() {
    let (addr, server) = spawn_canned_server(vec![
        "PUT_SUCCESS k hello world\n",
        "GET_SUCCESS k hello world\n",
        "DELETE_SUCCESS k\n",
    ])
    .await;

    let mut client = KvClient::connect(addr).await.unwrap();
    assert_eq!(client.peer(), addr.to_string());

    let reply = client.put("k", "hello world").await.unwrap();
    assert_eq!(reply.status, StatusType::PutSuccess);

    let reply = client.get("k").await.unwrap();
    assert_eq!(reply.value(), Some("hello world"));

    let reply = client.delete("k").await.unwrap();
    assert_eq!(reply.status, StatusType::DeleteSuccess);

    drop(client);
    let received = server.await.unwrap();
    assert_eq!(received, vec!["PUT k hello world", "GET k", "PUT k"]);
}

#[tokio::test]
async fn test_metadata_parses_keyrange_reply() {
    let (addr, server) = spawn_canned_server(vec![
        "KEYRANGE_SUCCESS 00000000000000000000000000000000,80000000000000000000000000000000,10.0.0.1:5000;80000000000000000000000000000000,00000000000000000000000000000000,10.0.0.2:5000;\n",
    ])
    .await;

    let mut client = KvClient::connect(addr).await.unwrap();
    let table = client.metadata().await.unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table[0].address, "10.0.0.1:5000");
    assert!(table[1].range.wraps());

    drop(client);
    assert_eq!(server.await.unwrap(), vec!["KEYRANGE"]);
}

#[tokio::test]
async fn test_metadata_rejects_non_keyrange_reply() {
    let (addr, server) = spawn_canned_server(vec!["SERVER_STOPPED\n"]).await;

    let mut client = KvClient::connect(addr).await.unwrap();
    let result = client.metadata().await;
    assert!(matches!(
        result,
        Err(RingstoreError::UnexpectedReply(StatusType::ServerStopped))
    ));

    drop(client);
    assert_eq!(server.await.unwrap(), vec!["KEYRANGE"]);
}

#[tokio::test]
async fn test_closed_connection_is_an_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        drop(stream);
    });

    let mut client = KvClient::connect(addr).await.unwrap();
    assert!(client.get("k").await.is_err());
}

#[tokio::test]
async fn test_connect_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    assert!(KvClient::connect(addr).await.is_err());
}
