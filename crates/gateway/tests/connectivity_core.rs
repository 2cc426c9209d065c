//! Integration test: ConnectivityCore <-> FIX counterparty over TCP
//!
//! Tests the full outbound path:
//! caller -> rate governor -> connection pool -> FIX session -> TCP -> exchange

use chrono::Utc;
use conduit_clock::ManualClock;
use conduit_core::{ExchangeId, TenantId, TransportType};
use conduit_fix::codec::{self, FrameDecoder, Header};
use conduit_fix::{FixError, FixMessage, FixVersion, MsgType, SessionStatus, tags};
use conduit_gateway::{
    ConnectivityConfig, ConnectivityCore, GatewayError, OrderDispatch, TcpConnector,
    load_config_from_str,
};
use conduit_pool::{AlertKind, Connection, ConnectionStatus};
use conduit_rate_governor::Priority;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

const RECV_TIMEOUT: Duration = Duration::from_secs(10);

/// Exchange side of one TCP FIX connection
struct TcpPeer {
    socket: TcpStream,
    decoder: FrameDecoder,
    next_seq: u64,
}

impl TcpPeer {
    async fn accept(listener: &TcpListener) -> Self {
        let (socket, _) = timeout(RECV_TIMEOUT, listener.accept())
            .await
            .expect("timed out waiting for connection")
            .expect("accept failed");
        Self {
            socket,
            decoder: FrameDecoder::new(),
            next_seq: 1,
        }
    }

    async fn recv(&mut self) -> FixMessage {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(frame) = self.decoder.next_frame() {
                codec::verify_checksum(&frame).expect("bad checksum from client");
                return codec::decode(&frame).expect("undecodable frame from client");
            }
            let n = timeout(RECV_TIMEOUT, self.socket.read(&mut buf))
                .await
                .expect("timed out waiting for client frame")
                .expect("read failed");
            assert!(n > 0, "client closed the connection");
            self.decoder.push(&buf[..n]);
        }
    }

    async fn expect(&mut self, msg_type: MsgType) -> FixMessage {
        let msg = self.recv().await;
        assert_eq!(msg.msg_type(), msg_type, "unexpected frame: {:?}", msg);
        msg
    }

    async fn send(&mut self, msg: &FixMessage) {
        let raw = codec::encode(
            msg,
            &Header {
                version: FixVersion::Fix44,
                sender_comp_id: "EXCHANGE",
                target_comp_id: "CLIENT",
                seq_num: self.next_seq,
                sending_time: Utc::now(),
            },
        );
        self.next_seq += 1;
        self.socket
            .write_all(raw.as_bytes())
            .await
            .expect("write failed");
    }

    /// Answer the client's logon
    async fn accept_logon(&mut self) {
        let logon = self.expect(MsgType::Logon).await;
        self.send(&FixMessage::logon(30, logon.get_bool(tags::RESET_SEQ_NUM_FLAG)))
            .await;
    }
}

fn config(port: u16, orders_per_minute: u32) -> ConnectivityConfig {
    config_with_session(port, orders_per_minute, r#""reconnect": { "enabled": false }"#)
}

/// Session settings are spliced into the exchange's `fix` block
fn config_with_session(port: u16, orders_per_minute: u32, session: &str) -> ConnectivityConfig {
    load_config_from_str(&format!(
        r#"{{
            "global": {{ "tenant": "desk-1" }},
            "exchanges": [{{
                "id": "Simulator",
                "fix": {{
                    "sender_comp_id": "CLIENT",
                    "target_comp_id": "EXCHANGE",
                    "host": "127.0.0.1",
                    "port": {port},
                    {session}
                }},
                "rate_limits": {{
                    "orders": {{ "requests_per_minute": {orders_per_minute} }},
                    "critical_reservation_pct": 0
                }}
            }}]
        }}"#
    ))
    .expect("config")
}

fn order(cl_ord_id: &str) -> FixMessage {
    FixMessage::new_order_single(
        cl_ord_id,
        [(tags::SYMBOL, "BTC-USD"), (tags::SIDE, "1")],
    )
}

async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    (listener, port)
}

/// Poll the tenant's FIX pool connection until `pred` holds
async fn wait_for_connection(
    core: &ConnectivityCore,
    tenant: &TenantId,
    exchange: &ExchangeId,
    pred: impl Fn(&Connection) -> bool,
) -> Connection {
    timeout(RECV_TIMEOUT, async {
        loop {
            let found = core
                .pool()
                .get_connection_pool(tenant, exchange)
                .and_then(|pool| pool.connections.into_iter().find(|c| pred(c)));
            if let Some(connection) = found {
                return connection;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("pool connection never reached the expected state")
}

#[tokio::test]
async fn test_order_round_trip_and_shutdown() {
    let _ = env_logger::try_init();

    let (listener, port) = listener().await;
    let core = ConnectivityCore::from_config(&config(port, 100)).expect("core");
    let tenant = TenantId::new("desk-1");
    let exchange = ExchangeId::new("simulator");

    let exchange_side = tokio::spawn(async move {
        let mut peer = TcpPeer::accept(&listener).await;
        peer.accept_logon().await;
        let order = peer.expect(MsgType::NewOrderSingle).await;
        let logout = peer.expect(MsgType::Logout).await;
        (order, logout)
    });

    let failures = core.logon_all().await;
    assert!(failures.is_empty(), "logon failed: {:?}", failures);

    let dispatch = core
        .send_fix_order(&tenant, &exchange, Priority::Normal, order("ord-1"))
        .await
        .expect("send");
    let receipt = match dispatch {
        OrderDispatch::Sent(receipt) => receipt,
        other => panic!("order was not sent immediately: {:?}", other),
    };
    assert_eq!(receipt.seq_num, 2);
    assert_eq!(receipt.exchange, exchange);

    let metrics = core
        .pool()
        .get_connection_metrics(receipt.connection_id)
        .expect("metrics");
    assert_eq!(metrics.messages_sent, 1);
    assert_eq!(metrics.error_rate, 0.0);

    let report = core.shutdown(&tenant, Duration::from_secs(1)).await;
    assert_eq!(report.connections_closed, 1);
    assert_eq!(report.requests_cancelled, 0);

    let (sent, logout) = exchange_side.await.expect("exchange task");
    assert_eq!(sent.get_text(tags::CL_ORD_ID).as_deref(), Some("ord-1"));
    assert_eq!(sent.seq_num(), Some(2));
    assert_eq!(logout.seq_num(), Some(3));

    let state = core
        .session(&exchange)
        .expect("session")
        .session_state()
        .await
        .expect("state");
    assert_eq!(state.status, SessionStatus::Disconnected);
}

#[tokio::test]
async fn test_rate_limited_orders_are_queued() {
    let _ = env_logger::try_init();

    let (listener, port) = listener().await;
    let clock = ManualClock::starting_now();
    let core = ConnectivityCore::new(
        &config(port, 1),
        Arc::new(TcpConnector::new()),
        clock.clone(),
    )
    .expect("core");
    let tenant = TenantId::new("desk-1");
    let exchange = ExchangeId::new("simulator");

    let exchange_side = tokio::spawn(async move {
        let mut peer = TcpPeer::accept(&listener).await;
        peer.accept_logon().await;
        let first = peer.expect(MsgType::NewOrderSingle).await;
        let second = peer.expect(MsgType::NewOrderSingle).await;
        (first, second, peer)
    });
    assert!(core.logon_all().await.is_empty());

    let first = core
        .send_fix_order(&tenant, &exchange, Priority::Normal, order("ord-1"))
        .await
        .expect("first");
    assert!(first.is_sent());

    // Window is full: the next two wait
    let cancelled = core
        .send_fix_order(&tenant, &exchange, Priority::Normal, order("ord-2"))
        .await
        .expect("second");
    let queued = core
        .send_fix_order(&tenant, &exchange, Priority::High, order("ord-3"))
        .await
        .expect("third");
    let OrderDispatch::Queued {
        request_id,
        wait_ms,
        ..
    } = &cancelled
    else {
        panic!("second order should be queued");
    };
    assert!(*wait_ms > 0 && *wait_ms <= 60_000);
    assert_eq!(core.governor().queue_len(&exchange), 2);

    core.governor()
        .cancel_request(&exchange, *request_id)
        .expect("cancel");
    assert!(matches!(cancelled.wait().await, Err(GatewayError::Dropped)));

    // Roll the window and let maintenance release the queue
    clock.advance(chrono::Duration::seconds(61));
    core.run_maintenance(&tenant);
    let receipt = timeout(RECV_TIMEOUT, queued.wait())
        .await
        .expect("queued order never went out")
        .expect("queued order failed");
    assert_eq!(receipt.seq_num, 3);
    assert_eq!(core.governor().queue_len(&exchange), 0);

    let (first, second, _peer) = exchange_side.await.expect("exchange task");
    assert_eq!(first.get_text(tags::CL_ORD_ID).as_deref(), Some("ord-1"));
    assert_eq!(second.get_text(tags::CL_ORD_ID).as_deref(), Some("ord-3"));

    core.shutdown(&tenant, Duration::from_millis(200)).await;
}

#[tokio::test]
async fn test_maintenance_before_first_order_keeps_trading() {
    let _ = env_logger::try_init();

    let (listener, port) = listener().await;
    let core = ConnectivityCore::from_config(&config(port, 100)).expect("core");
    let tenant = TenantId::new("desk-1");
    let exchange = ExchangeId::new("simulator");

    let exchange_side = tokio::spawn(async move {
        let mut peer = TcpPeer::accept(&listener).await;
        peer.accept_logon().await;
        let first = peer.expect(MsgType::NewOrderSingle).await;
        let second = peer.expect(MsgType::NewOrderSingle).await;
        (first, second, peer)
    });
    assert!(core.logon_all().await.is_empty());

    // No order yet, so no pool to judge
    core.run_maintenance(&tenant);
    assert!(!core.pool().is_trading_paused(&tenant, &exchange));

    let first = core
        .send_fix_order(&tenant, &exchange, Priority::Normal, order("ord-1"))
        .await
        .expect("first order");
    assert!(first.is_sent());

    // The pooled connection is live and healthy
    core.run_maintenance(&tenant);
    assert!(!core.pool().is_trading_paused(&tenant, &exchange));
    let second = core
        .send_fix_order(&tenant, &exchange, Priority::Normal, order("ord-2"))
        .await
        .expect("second order")
        .wait()
        .await
        .expect("receipt");
    assert_eq!(second.seq_num, 3);

    let (first, second, _peer) = exchange_side.await.expect("exchange task");
    assert_eq!(first.get_text(tags::CL_ORD_ID).as_deref(), Some("ord-1"));
    assert_eq!(second.get_text(tags::CL_ORD_ID).as_deref(), Some("ord-2"));

    core.shutdown(&tenant, Duration::from_millis(200)).await;
}

#[tokio::test]
async fn test_dropped_session_marks_pool_and_pauses() {
    let _ = env_logger::try_init();

    let (listener, port) = listener().await;
    let core = ConnectivityCore::from_config(&config(port, 100)).expect("core");
    let tenant = TenantId::new("desk-1");
    let exchange = ExchangeId::new("simulator");
    let mut alerts = core.pool().subscribe_alerts();

    let exchange_side = tokio::spawn(async move {
        let mut peer = TcpPeer::accept(&listener).await;
        peer.accept_logon().await;
        peer.expect(MsgType::NewOrderSingle).await;
        // Exchange goes away without a logout
    });
    assert!(core.logon_all().await.is_empty());

    let receipt = core
        .send_fix_order(&tenant, &exchange, Priority::Normal, order("ord-1"))
        .await
        .expect("send")
        .wait()
        .await
        .expect("receipt");
    exchange_side.await.expect("exchange task");

    let lost = timeout(RECV_TIMEOUT, alerts.recv())
        .await
        .expect("no alert")
        .expect("alert");
    assert_eq!(lost.kind, AlertKind::ConnectionLost);
    assert_eq!(lost.connection_id, Some(receipt.connection_id));

    let connection = wait_for_connection(&core, &tenant, &exchange, |c| {
        c.id == receipt.connection_id
    })
    .await;
    assert_eq!(connection.status, ConnectionStatus::Disconnected);
    assert_eq!(
        connection.metrics.last_error.as_deref(),
        Some("FIX session disconnected")
    );

    let state = core
        .session(&exchange)
        .expect("session")
        .session_state()
        .await
        .expect("state");
    assert_eq!(state.status, SessionStatus::Disconnected);
    assert!(!state.logged_on);

    core.run_maintenance(&tenant);
    assert!(core.pool().is_trading_paused(&tenant, &exchange));
    let err = core
        .send_fix_order(&tenant, &exchange, Priority::Normal, order("ord-2"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::TradingPaused { .. }));
}

#[tokio::test]
async fn test_session_reconnect_restores_pool_connection() {
    let _ = env_logger::try_init();

    let (listener, port) = listener().await;
    let core = ConnectivityCore::from_config(&config_with_session(
        port,
        100,
        r#""reset_on_logon": true,
           "reconnect": { "initial_delay_ms": 50, "max_delay_ms": 100, "jitter_percent": 0 }"#,
    ))
    .expect("core");
    let tenant = TenantId::new("desk-1");
    let exchange = ExchangeId::new("simulator");

    let exchange_side = tokio::spawn(async move {
        let mut peer = TcpPeer::accept(&listener).await;
        peer.accept_logon().await;
        peer.expect(MsgType::NewOrderSingle).await;
        drop(peer);

        let mut peer = TcpPeer::accept(&listener).await;
        peer.accept_logon().await;
        peer
    });
    assert!(core.logon_all().await.is_empty());

    let receipt = core
        .send_fix_order(&tenant, &exchange, Priority::Normal, order("ord-1"))
        .await
        .expect("send")
        .wait()
        .await
        .expect("receipt");
    let _peer = exchange_side.await.expect("exchange task");

    let connection = wait_for_connection(&core, &tenant, &exchange, |c| {
        c.id == receipt.connection_id
            && c.status == ConnectionStatus::Connected
            && c.metrics.reconnection_count == 1
    })
    .await;
    assert_eq!(connection.reconnect_attempts, 0);

    core.run_maintenance(&tenant);
    assert!(!core.pool().is_trading_paused(&tenant, &exchange));

    core.shutdown(&tenant, Duration::from_millis(200)).await;
}

#[tokio::test]
async fn test_paused_trading_only_lets_critical_through() {
    let _ = env_logger::try_init();

    let (_listener, port) = listener().await;
    let core = ConnectivityCore::from_config(&config(port, 100)).expect("core");
    let tenant = TenantId::new("desk-1");
    let exchange = ExchangeId::new("simulator");
    let mut alerts = core.pool().subscribe_alerts();

    // A pool whose only connection is down is unhealthy, which pauses trading
    let down = core
        .pool()
        .get_connection(&tenant, &exchange, TransportType::Fix)
        .expect("connection");
    core.pool()
        .mark_disconnected(down.id, "link down")
        .expect("mark");
    core.run_maintenance(&tenant);
    assert!(core.pool().is_trading_paused(&tenant, &exchange));
    assert_eq!(
        alerts.recv().await.expect("alert").kind,
        AlertKind::ConnectionLost
    );
    assert_eq!(
        alerts.recv().await.expect("alert").kind,
        AlertKind::TradingPaused
    );

    let err = core
        .send_fix_order(&tenant, &exchange, Priority::High, order("ord-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::TradingPaused { .. }));

    // Critical passes the pause but the session was never connected
    let err = core
        .send_fix_order(&tenant, &exchange, Priority::Critical, order("cxl-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Fix(FixError::NotConnected)));

    let pool = core
        .pool()
        .get_connection_pool(&tenant, &exchange)
        .expect("pool");
    assert_eq!(pool.connections.len(), 2);
    let used = pool
        .connections
        .iter()
        .find(|c| c.id != down.id)
        .expect("fresh connection");
    assert_eq!(
        used.metrics.last_error.as_deref(),
        Some("Session is not connected")
    );
    assert_eq!(core.pool().in_flight_count(), 0);
}

#[tokio::test]
async fn test_unknown_exchange_and_invalid_config() {
    let core = ConnectivityCore::from_config(&config(1, 100)).expect("core");
    let err = core
        .send_fix_order(
            &TenantId::new("desk-1"),
            &ExchangeId::new("kraken"),
            Priority::Normal,
            order("ord-1"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::NoFixSession(ex) if ex.as_str() == "kraken"));

    let empty = load_config_from_str(r#"{"exchanges":[]}"#).expect("parse");
    assert!(matches!(
        ConnectivityCore::from_config(&empty),
        Err(GatewayError::Config(_))
    ));
}
