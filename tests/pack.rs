//! Public-surface tests: role detection against the real process
//! environment, and the multi-worker shared-port scenario end to end.

use std::{sync::Arc, time::Duration};

use procpack::{bind_listener, Network, Pack, PackListener, Role, Serve, TcpServer};
use serial_test::serial;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

const PARENT: &str = "PROCPACK_PARENT_PID";
const CORE: &str = "PROCPACK_CPU_CORE";
const PREV: &str = "PROCPACK_PREV_PID";

fn clear_tokens() {
    for name in [PARENT, CORE, PREV] {
        std::env::remove_var(name);
    }
}

#[test]
#[serial]
fn fresh_process_is_a_supervisor() {
    clear_tokens();
    let pack = Pack::builder().build().unwrap();
    assert!(pack.is_supervisor());
    assert_eq!(pack.worker_core(), None);
}

#[test]
#[serial]
fn spawn_tokens_make_a_worker() {
    clear_tokens();
    std::env::set_var(PARENT, "4242");
    std::env::set_var(CORE, "3");
    let pack = Pack::builder().build().unwrap();
    assert_eq!(pack.role(), Role::Worker { core: 3 });
    assert_eq!(pack.worker_core(), Some(3));
    clear_tokens();
}

#[test]
#[serial]
fn malformed_core_assignment_is_fatal() {
    clear_tokens();
    std::env::set_var(PARENT, "4242");
    std::env::set_var(CORE, "banana");
    assert!(Pack::builder().build().is_err());
    clear_tokens();
}

#[test]
#[serial]
fn predecessor_token_does_not_change_the_role() {
    clear_tokens();
    std::env::set_var(PREV, "77");
    let pack = Pack::builder().build().unwrap();
    assert!(pack.is_supervisor());
    clear_tokens();
}

async fn echo(mut conn: procpack::Connection) {
    let mut buf = [0u8; 256];
    loop {
        match conn.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if conn.write_all(&buf[..n]).await.is_err() {
                    break;
                }
            }
        }
    }
}

#[tokio::test]
async fn two_accept_loops_share_one_port() {
    // Two independent listeners on the identical address, each driven by its
    // own adapter, the way two worker processes share a port.
    let first = bind_listener(Network::Tcp, "127.0.0.1:0").unwrap();
    let port = match &first {
        PackListener::Tcp(listener) => listener.local_addr().unwrap().port(),
        PackListener::Unix(_) => unreachable!(),
    };
    let address = format!("127.0.0.1:{port}");
    let second = bind_listener(Network::Tcp, &address).unwrap();

    let server_a = Arc::new(TcpServer::new(echo));
    let server_b = Arc::new(TcpServer::new(echo));
    let serving_a = {
        let server = Arc::clone(&server_a);
        tokio::spawn(async move { server.serve(first).await })
    };
    let serving_b = {
        let server = Arc::clone(&server_b);
        tokio::spawn(async move { server.serve(second).await })
    };

    // Whichever accept loop the kernel picks, every connection is served.
    for i in 0..10u8 {
        let mut client = TcpStream::connect(address.as_str()).await.unwrap();
        client.write_all(&[i; 8]).await.unwrap();
        let mut reply = [0u8; 8];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [i; 8]);
    }

    server_a.graceful_stop().await;
    server_b.graceful_stop().await;
    tokio::time::timeout(Duration::from_secs(5), serving_a)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), serving_b)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
