//! Client tests against an in-process server speaking the wire protocol.

use std::future::Future;
use std::time::Duration;

use docql_client::codec::{Frame, FrameCodec};
use docql_client::handshake::{JSON_PROTOCOL_MAGIC, VERSION_MAGIC};
use docql_client::{ConnectOptions, connect_with};
use docql_core::{Expr, table};
use docql_error::ErrorKind;
use docql_proto::{Datum, Request, RequestEnvelope, Response};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

type ServerConn = Framed<TcpStream, FrameCodec>;

async fn read_handshake(stream: &mut TcpStream) -> String {
    assert_eq!(VERSION_MAGIC, stream.read_u32_le().await.unwrap());
    let len = stream.read_u32_le().await.unwrap() as usize;
    let mut key = vec![0; len];
    stream.read_exact(&mut key).await.unwrap();
    assert_eq!(JSON_PROTOCOL_MAGIC, stream.read_u32_le().await.unwrap());
    String::from_utf8(key).unwrap()
}

/// Accept a single connection and hand it to `serve` after the handshake.
async fn spawn_server<F, Fut>(serve: F) -> (ConnectOptions, JoinHandle<()>)
where
    F: FnOnce(ServerConn) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_handshake(&mut stream).await;
        stream.write_all(b"SUCCESS\0").await.unwrap();
        serve(Framed::new(stream, FrameCodec::default())).await;
    });
    (ConnectOptions::new("127.0.0.1").with_port(port), handle)
}

async fn recv(conn: &mut ServerConn) -> RequestEnvelope {
    let frame = conn.next().await.unwrap().unwrap();
    let env: RequestEnvelope = serde_json::from_slice(&frame.payload).unwrap();
    assert_eq!(frame.token, env.token);
    env
}

async fn reply(conn: &mut ServerConn, resp: Response) {
    let payload = serde_json::to_vec(&resp).unwrap();
    conn.send(Frame {
        token: resp.token,
        payload: payload.into(),
    })
    .await
    .unwrap();
}

/// Literal value of a start request's term.
fn start_literal(env: &RequestEnvelope) -> Datum {
    match &env.request {
        Request::Start { term, .. } => term.datum_value().unwrap(),
        other => panic!("expected start, got {other:?}"),
    }
}

#[tokio::test]
async fn simple_round_trip() {
    logutil::init_test();
    let (opts, server) = spawn_server(|mut conn| async move {
        let env = recv(&mut conn).await;
        match &env.request {
            Request::Start { term, options } => {
                assert_eq!("ADD(1, 2)", term.to_string());
                assert_eq!(r#"DB("test")"#, options["db"].to_string());
            }
            other => panic!("expected start, got {other:?}"),
        }
        reply(&mut conn, Response::value(env.token, 3)).await;
    })
    .await;

    let session = connect_with(&opts).await.unwrap();
    let mut cursor = Expr::from(1).add(2).run(&session).await.unwrap();
    let v: i64 = cursor.one().await.unwrap();
    assert_eq!(3, v);

    server.await.unwrap();
}

#[tokio::test]
async fn concurrent_queries_answered_out_of_order() {
    let (opts, server) = spawn_server(|mut conn| async move {
        let first = recv(&mut conn).await;
        let second = recv(&mut conn).await;
        for env in [second, first] {
            let value = start_literal(&env);
            reply(&mut conn, Response::value(env.token, value)).await;
        }
    })
    .await;

    let session = connect_with(&opts).await.unwrap();
    let a = async {
        let mut cursor = Expr::from("a").run(&session).await.unwrap();
        cursor.one::<String>().await.unwrap()
    };
    let b = async {
        let mut cursor = Expr::from("b").run(&session).await.unwrap();
        cursor.one::<String>().await.unwrap()
    };
    let (a, b) = tokio::join!(a, b);
    assert_eq!("a", a);
    assert_eq!("b", b);

    server.await.unwrap();
}

#[tokio::test]
async fn continuation_across_batches() {
    let (opts, server) = spawn_server(|mut conn| async move {
        let start = recv(&mut conn).await;
        reply(
            &mut conn,
            Response::partial(start.token, vec![1.into(), 2.into()], "c1"),
        )
        .await;

        let cont = recv(&mut conn).await;
        assert_eq!(RequestEnvelope::continue_with(start.token, "c1"), cont);
        reply(&mut conn, Response::partial(cont.token, vec![3.into()], "c2")).await;

        let cont = recv(&mut conn).await;
        assert_eq!(RequestEnvelope::continue_with(start.token, "c2"), cont);
        reply(&mut conn, Response::sequence(cont.token, vec![4.into()])).await;
    })
    .await;

    let session = connect_with(&opts).await.unwrap();
    let mut cursor = table("numbers").unwrap().run(&session).await.unwrap();
    let values: Vec<i64> = cursor.collect().await.unwrap();
    assert_eq!(vec![1, 2, 3, 4], values);

    server.await.unwrap();
}

#[tokio::test]
async fn close_cursor_sends_stop() {
    let (opts, server) = spawn_server(|mut conn| async move {
        let start = recv(&mut conn).await;
        reply(
            &mut conn,
            Response::partial(start.token, vec![1.into()], "c1"),
        )
        .await;

        let stop = recv(&mut conn).await;
        assert_eq!(RequestEnvelope::stop(start.token), stop);
        reply(&mut conn, Response::done(stop.token)).await;
    })
    .await;

    let session = connect_with(&opts).await.unwrap();
    let mut cursor = table("numbers").unwrap().run(&session).await.unwrap();
    assert_eq!(Some(Datum::from(1)), cursor.next().await.unwrap());
    cursor.close().await.unwrap();

    server.await.unwrap();
}

#[tokio::test]
async fn cancelled_fetch_frees_token() {
    let (opts, server) = spawn_server(|mut conn| async move {
        let start = recv(&mut conn).await;
        reply(
            &mut conn,
            Response::partial(start.token, vec![1.into()], "c1"),
        )
        .await;

        // Left unanswered.
        let cont = recv(&mut conn).await;
        assert_eq!(RequestEnvelope::continue_with(start.token, "c1"), cont);

        let stop = recv(&mut conn).await;
        assert_eq!(RequestEnvelope::stop(start.token), stop);
        reply(&mut conn, Response::done(stop.token)).await;
    })
    .await;

    let session = connect_with(&opts).await.unwrap();
    let mut cursor = table("numbers").unwrap().run(&session).await.unwrap();
    assert_eq!(Some(Datum::from(1)), cursor.next().await.unwrap());

    let timed_out = tokio::time::timeout(Duration::from_millis(50), cursor.next()).await;
    assert!(timed_out.is_err());

    cursor.close().await.unwrap();
    let err = cursor.next().await.unwrap_err();
    assert_eq!(ErrorKind::Connection, err.kind());

    server.await.unwrap();
}

#[tokio::test]
async fn handshake_rejected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let key = read_handshake(&mut stream).await;
        assert_eq!("wrong", key);
        stream
            .write_all(b"ERROR: Incorrect authorization key.\0")
            .await
            .unwrap();
    });

    let opts = ConnectOptions::new("127.0.0.1")
        .with_port(port)
        .with_auth_key("wrong");
    let err = connect_with(&opts).await.unwrap_err();
    assert_eq!(ErrorKind::Connection, err.kind());
    assert!(err.to_string().contains("Incorrect authorization key"));

    server.await.unwrap();
}

#[tokio::test]
async fn server_hangup_fails_pending_request() {
    let (opts, server) = spawn_server(|mut conn| async move {
        recv(&mut conn).await;
        drop(conn);
    })
    .await;

    let session = connect_with(&opts).await.unwrap();
    let err = Expr::from(1).run(&session).await.unwrap_err();
    assert_eq!(ErrorKind::Connection, err.kind());

    server.await.unwrap();
}

#[tokio::test]
async fn closed_session_rejects_queries() {
    let (opts, server) = spawn_server(|mut conn| async move {
        // Reads until the client hangs up.
        while conn.next().await.is_some() {}
    })
    .await;

    let session = connect_with(&opts).await.unwrap();
    session.close().await.unwrap();
    let err = Expr::from(1).run(&session).await.unwrap_err();
    assert_eq!(ErrorKind::Connection, err.kind());

    server.await.unwrap();
}

#[tokio::test]
async fn url_database_becomes_default() {
    let (opts, server) = spawn_server(|mut conn| async move {
        let env = recv(&mut conn).await;
        match &env.request {
            Request::Start { term, options } => {
                assert_eq!(r#"TABLE(DB("prod"), "t")"#, term.to_string());
                assert_eq!(r#"DB("prod")"#, options["db"].to_string());
            }
            other => panic!("expected start, got {other:?}"),
        }
        reply(&mut conn, Response::sequence(env.token, Vec::new())).await;
    })
    .await;

    let url = format!("docql://{}/prod", opts.address());
    let session = docql_client::connect_url(&url).await.unwrap();
    assert_eq!("prod", session.default_database());
    let mut cursor = table("t").unwrap().run(&session).await.unwrap();
    assert_eq!(None, cursor.next().await.unwrap());

    server.await.unwrap();
}
