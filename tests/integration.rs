//! Integration tests for xbee-client.
//!
//! Each test drives a real client over an in-memory duplex stream. The far
//! end plays the radio: it decodes the request frames the client writes and
//! answers with hand-built response frames.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

use xbee_client::protocol::{encode_envelope, CommandStatus, DeliveryStatus, FrameBuffer};
use xbee_client::{
    Address16, Address64, ApiMode, Destination, ExplicitTransmit, LocalCommand, Module,
    RemoteCommand, RemoteTransmit, Transport, XBee, XBeeBuilder, XBeeError,
};

const PUMP_ADDRESS: [u8; 8] = [0x00, 0x13, 0xA2, 0x00, 0x40, 0x0A, 0x01, 0x27];

/// The radio end of the link.
struct Radio {
    stream: DuplexStream,
    buffer: FrameBuffer,
    mode: ApiMode,
    received: VecDeque<Bytes>,
}

impl Radio {
    fn new(stream: DuplexStream, mode: ApiMode) -> Self {
        Self {
            stream,
            buffer: FrameBuffer::new(mode),
            mode,
            received: VecDeque::new(),
        }
    }

    /// Next request frame data written by the client.
    async fn request(&mut self) -> Bytes {
        let mut buf = [0u8; 256];
        loop {
            if let Some(frame) = self.received.pop_front() {
                return frame;
            }
            let n = self.stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "client closed the link");
            self.received.extend(self.buffer.push(&buf[..n]));
        }
    }

    /// Whether the client writes nothing for a while.
    async fn is_silent(&mut self) -> bool {
        tokio::time::timeout(Duration::from_millis(50), self.request())
            .await
            .is_err()
    }

    async fn reply(&mut self, frame_data: &[u8]) {
        let wire = encode_envelope(frame_data, self.mode).unwrap();
        self.stream.write_all(&wire).await.unwrap();
    }
}

fn connect(module: Module) -> (XBee, Radio) {
    connect_with(XBeeBuilder::new(module))
}

fn connect_with(builder: XBeeBuilder) -> (XBee, Radio) {
    let (client_end, radio_end) = duplex(4096);
    let xbee = builder.connect(Transport::new(client_end)).unwrap();
    let mode = xbee.api_mode();
    (xbee, Radio::new(radio_end, mode))
}

fn at_response(id: u8, command: &[u8], status: u8, data: &[u8]) -> Vec<u8> {
    let mut frame = vec![0x88, id, command[0], command[1], status];
    frame.extend_from_slice(data);
    frame
}

fn remote_response(id: u8, command: &[u8], status: u8, data: &[u8]) -> Vec<u8> {
    let mut frame = vec![0x97, id];
    frame.extend_from_slice(&PUMP_ADDRESS);
    frame.extend_from_slice(&[0x12, 0x34, command[0], command[1], status]);
    frame.extend_from_slice(data);
    frame
}

fn transmit_status(id: u8, delivery: u8) -> Vec<u8> {
    vec![0x8B, id, 0xFF, 0xFE, 0x00, delivery, 0x00]
}

fn nd_response(id: u8, name: &str, last_byte: u8) -> Vec<u8> {
    let mut data = vec![0x12, last_byte];
    data.extend_from_slice(&[0x00, 0x13, 0xA2, 0x00, 0x40, 0x0A, 0x01, last_byte]);
    data.extend_from_slice(name.as_bytes());
    data.push(0x00);
    data.extend_from_slice(&[0xFF, 0xFE, 0x01, 0x00, 0xC1, 0x05, 0x10, 0x1E]);
    at_response(id, b"ND", 0x00, &data)
}

fn dn_answer() -> Vec<u8> {
    let mut data = vec![0x12, 0x34];
    data.extend_from_slice(&PUMP_ADDRESS);
    data
}

#[tokio::test]
async fn test_local_command_returns_data() {
    let (xbee, mut radio) = connect(Module::ZigBee);

    let radio_side = async {
        let request = radio.request().await;
        assert_eq!(request[0], 0x08);
        assert_eq!(&request[2..4], b"NI");
        radio.reply(&at_response(request[1], b"NI", 0x00, b"HUB")).await;
    };

    let (result, _) = tokio::join!(xbee.local_command("NI"), radio_side);
    assert_eq!(result.unwrap().as_ref(), b"HUB");
    assert_eq!(xbee.in_flight(), 0);
}

#[tokio::test]
async fn test_local_command_sends_parameter() {
    let (xbee, mut radio) = connect(Module::ZigBee);

    let radio_side = async {
        let request = radio.request().await;
        assert_eq!(&request[2..], b"NIPUMP");
        radio.reply(&at_response(request[1], b"NI", 0x00, b"")).await;
    };

    let command = LocalCommand::new("NI").parameter("PUMP");
    let (result, _) = tokio::join!(xbee.local_command(command), radio_side);
    assert!(result.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_requests_get_distinct_ids() {
    let (xbee, mut radio) = connect(Module::ZigBee);

    let radio_side = async {
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(radio.request().await[1]);
        }
        // Answer in reverse order; each answer echoes its id as data.
        for &id in ids.iter().rev() {
            radio.reply(&at_response(id, b"SH", 0x00, &[id])).await;
        }
        ids
    };

    let (a, b, c, ids) = tokio::join!(
        xbee.local_command("SH"),
        xbee.local_command("SH"),
        xbee.local_command("SH"),
        radio_side
    );

    let mut unique = ids.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), 3);
    assert!(!ids.contains(&0));

    let answers: Vec<u8> = [a, b, c].into_iter().map(|r| r.unwrap()[0]).collect();
    assert_eq!(answers, ids);
}

#[tokio::test]
async fn test_non_matching_frames_are_inert() {
    let (xbee, mut radio) = connect(Module::ZigBee);

    let radio_side = async {
        let request = radio.request().await;
        let id = request[1];
        // Right kind, wrong id.
        radio.reply(&at_response(id.wrapping_add(1), b"NI", 0x00, b"WRONG")).await;
        // Right id, wrong kind.
        radio.reply(&remote_response(id, b"NI", 0x00, b"WRONG")).await;
        radio.reply(&transmit_status(id, 0x00)).await;
        // Both wrong.
        radio.reply(&[0x8A, 0x06]).await;
        radio.reply(&at_response(id, b"NI", 0x00, b"RIGHT")).await;
    };

    let (result, _) = tokio::join!(xbee.local_command("NI"), radio_side);
    assert_eq!(result.unwrap().as_ref(), b"RIGHT");
}

#[tokio::test]
async fn test_duplicate_response_is_ignored() {
    let (xbee, mut radio) = connect(Module::ZigBee);

    let radio_side = async {
        let request = radio.request().await;
        radio.reply(&at_response(request[1], b"NI", 0x00, b"FIRST")).await;
        radio.reply(&at_response(request[1], b"NI", 0x00, b"SECOND")).await;
    };

    let (result, _) = tokio::join!(xbee.local_command("NI"), radio_side);
    assert_eq!(result.unwrap().as_ref(), b"FIRST");
}

#[tokio::test(start_paused = true)]
async fn test_timeout_fires_at_deadline() {
    let (xbee, mut radio) = connect(Module::ZigBee);
    let xbee = Arc::new(xbee);

    let client = xbee.clone();
    let pending = tokio::spawn(async move {
        client
            .local_command(LocalCommand::new("NI").timeout(Duration::from_millis(100)))
            .await
    });

    radio.request().await;

    tokio::time::advance(Duration::from_millis(99)).await;
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    assert!(!pending.is_finished());

    tokio::time::advance(Duration::from_millis(1)).await;
    let err = pending.await.unwrap().unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(err.to_string(), "operation timed out after 100 ms");
    assert_eq!(xbee.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_late_response_after_timeout_is_ignored() {
    let (xbee, mut radio) = connect_with(
        XBeeBuilder::new(Module::ZigBee).default_timeout(Duration::from_millis(100)),
    );

    let first = tokio::join!(xbee.local_command("NI"), radio.request()).0;
    assert!(first.unwrap_err().is_timeout());

    let radio_side = async {
        let request = radio.request().await;
        // The stale answer to the first request arrives first.
        radio.reply(&at_response(request[1].wrapping_sub(1), b"NI", 0x00, b"OLD")).await;
        radio.reply(&at_response(request[1], b"NI", 0x00, b"NEW")).await;
    };
    let (second, _) = tokio::join!(xbee.local_command("NI"), radio_side);
    assert_eq!(second.unwrap().as_ref(), b"NEW");
}

#[tokio::test]
async fn test_command_status_maps_to_error() {
    let (xbee, mut radio) = connect(Module::ZigBee);

    let radio_side = async {
        let request = radio.request().await;
        radio.reply(&at_response(request[1], b"ZZ", 0x02, b"")).await;
    };

    let (result, _) = tokio::join!(xbee.local_command("ZZ"), radio_side);
    let err = result.unwrap_err();
    assert!(matches!(
        err,
        XBeeError::CommandFailed(CommandStatus::InvalidCommand)
    ));
    assert_eq!(err.to_string(), "Invalid Command (0x02)");
}

#[tokio::test]
async fn test_delivery_status_maps_to_error() {
    let (xbee, mut radio) = connect(Module::ZigBee);

    let radio_side = async {
        let request = radio.request().await;
        assert_eq!(request[0], 0x10);
        radio.reply(&transmit_status(request[1], 0x24)).await;
    };

    let transmit = RemoteTransmit::new(Address64(PUMP_ADDRESS), "on");
    let (result, _) = tokio::join!(xbee.remote_transmit(transmit), radio_side);
    let err = result.unwrap_err();
    assert!(matches!(err, XBeeError::DeliveryFailed(DeliveryStatus(0x24))));
    assert_eq!(err.to_string(), "Address Not Found (0x24)");
}

#[tokio::test]
async fn test_remote_command_by_16_bit_address() {
    let (xbee, mut radio) = connect(Module::ZNet);

    let radio_side = async {
        let request = radio.request().await;
        assert_eq!(request[0], 0x17);
        assert_eq!(&request[2..10], Address64::UNKNOWN.as_bytes());
        assert_eq!(&request[10..12], &[0x12, 0x34]);
        assert_eq!(request[12], 0x02);
        assert_eq!(&request[13..], &[b'I', b'R', 0x05]);
        radio.reply(&remote_response(request[1], b"IR", 0x00, b"")).await;
    };

    let command = RemoteCommand::new("IR", Destination::address16("1234").unwrap())
        .parameter(vec![0x05]);
    let (result, _) = tokio::join!(xbee.remote_command(command), radio_side);
    assert!(result.unwrap().is_empty());
}

#[tokio::test]
async fn test_node_id_resolved_once() {
    let (xbee, mut radio) = connect(Module::ZigBee);

    let radio_side = async {
        let lookup = radio.request().await;
        assert_eq!(&lookup[2..4], b"DN");
        assert_eq!(&lookup[4..], b"PUMP");
        radio.reply(&at_response(lookup[1], b"DN", 0x00, &dn_answer())).await;

        for _ in 0..2 {
            let transmit = radio.request().await;
            assert_eq!(transmit[0], 0x10);
            assert_eq!(&transmit[2..10], &PUMP_ADDRESS);
            assert_eq!(&transmit[10..12], Address16::UNKNOWN.as_bytes());
            assert_eq!(&transmit[14..], b"on");
            radio.reply(&transmit_status(transmit[1], 0x00)).await;
        }
    };

    let client_side = async {
        let pump = Destination::node_id("PUMP");
        xbee.remote_transmit(RemoteTransmit::new(pump.clone(), "on"))
            .await
            .unwrap();
        xbee.remote_transmit(RemoteTransmit::new(pump, "on"))
            .await
            .unwrap();
    };

    tokio::join!(client_side, radio_side);
    assert_eq!(xbee.cached_node("PUMP"), Some(Address64(PUMP_ADDRESS)));
}

#[tokio::test]
async fn test_cache_hit_writes_nothing() {
    let (xbee, mut radio) = connect(Module::ZigBee);

    let radio_side = async {
        let lookup = radio.request().await;
        radio.reply(&at_response(lookup[1], b"DN", 0x00, &dn_answer())).await;
    };
    let (first, _) = tokio::join!(xbee.lookup_node("PUMP"), radio_side);
    assert_eq!(first.unwrap(), Address64(PUMP_ADDRESS));

    let second = xbee.lookup_node("PUMP").await.unwrap();
    assert_eq!(second, Address64(PUMP_ADDRESS));
    assert!(radio.is_silent().await);
}

#[tokio::test(start_paused = true)]
async fn test_node_not_found_keeps_cause() {
    let (xbee, mut radio) = connect_with(
        XBeeBuilder::new(Module::ZigBee).default_timeout(Duration::from_millis(200)),
    );

    let (result, _) = tokio::join!(xbee.lookup_node("GHOST"), radio.request());
    let err = result.unwrap_err();

    assert_eq!(err.to_string(), "Node not found");
    match err {
        XBeeError::NodeNotFound { node_id, source } => {
            assert_eq!(node_id, "GHOST");
            assert!(source.is_timeout());
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(xbee.cached_node("GHOST"), None);
}

#[tokio::test]
async fn test_failed_lookup_reports_not_found() {
    let (xbee, mut radio) = connect(Module::ZigBee);

    let radio_side = async {
        let lookup = radio.request().await;
        radio.reply(&at_response(lookup[1], b"DN", 0x01, b"")).await;
    };

    let command = RemoteCommand::new("NI", Destination::node_id("GHOST"));
    let (result, _) = tokio::join!(xbee.remote_command(command), radio_side);
    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "Node not found");
    assert!(radio.is_silent().await);
}

#[tokio::test]
async fn test_802_15_4_transmit_uses_tx_request() {
    let (xbee, mut radio) = connect(Module::Ieee802154);

    let radio_side = async {
        let request = radio.request().await;
        assert_eq!(request[0], 0x00);
        assert_eq!(&request[2..10], &PUMP_ADDRESS);
        assert_eq!(&request[11..], b"hello");
        radio.reply(&[0x89, request[1], 0x00]).await;

        let request = radio.request().await;
        assert_eq!(request[0], 0x01);
        assert_eq!(&request[2..4], &[0x00, 0x07]);
        radio.reply(&[0x89, request[1], 0x01]).await;
    };

    let client_side = async {
        let delivered = xbee
            .remote_transmit(RemoteTransmit::new(Address64(PUMP_ADDRESS), "hello"))
            .await;
        let failed = xbee
            .remote_transmit(RemoteTransmit::new(Address16([0x00, 0x07]), "hello"))
            .await;
        (delivered, failed)
    };

    let ((delivered, failed), _) = tokio::join!(client_side, radio_side);
    assert!(delivered.is_ok());
    assert_eq!(failed.unwrap_err().to_string(), "MAC ACK Failure (0x01)");
}

#[tokio::test]
async fn test_explicit_transmit() {
    let (xbee, mut radio) = connect(Module::ZigBee);

    let radio_side = async {
        let request = radio.request().await;
        assert_eq!(request[0], 0x11);
        assert_eq!(&request[12..14], &[0xE8, 0xE8]);
        assert_eq!(&request[14..18], &[0x00, 0x11, 0xC1, 0x05]);
        assert_eq!(request[18], 2);
        assert_eq!(&request[20..], b"ping");
        radio.reply(&transmit_status(request[1], 0x00)).await;
    };

    let transmit = ExplicitTransmit::new(Address64(PUMP_ADDRESS), 0xE8, 0xE8, 0x0011, 0xC105)
        .broadcast_radius(2)
        .data("ping");
    let (result, _) = tokio::join!(xbee.explicit_transmit(transmit), radio_side);
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_escaped_mode_round_trip() {
    let (xbee, mut radio) =
        connect_with(XBeeBuilder::new(Module::ZigBee).api_mode(ApiMode::Escaped));

    let radio_side = async {
        let request = radio.request().await;
        assert_eq!(&request[4..], &[0x7E, 0x11]);
        radio
            .reply(&at_response(request[1], b"KY", 0x00, &[0x7D, 0x13, 0x7E]))
            .await;
    };

    let command = LocalCommand::new("KY").parameter(vec![0x7E, 0x11]);
    let (result, _) = tokio::join!(xbee.local_command(command), radio_side);
    assert_eq!(result.unwrap().as_ref(), &[0x7D, 0x13, 0x7E]);
}

#[tokio::test(start_paused = true)]
async fn test_discovery_window() {
    let (xbee, mut radio) = connect_with(
        XBeeBuilder::new(Module::ZigBee).discovery_grace(Duration::from_millis(100)),
    );
    let xbee = Arc::new(xbee);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let client = xbee.clone();
    let sink = seen.clone();
    let discovery = tokio::spawn(async move {
        client
            .discover_nodes(move |node| sink.lock().unwrap().push(node.node_identifier))
            .await
    });

    let nt = radio.request().await;
    assert_eq!(&nt[2..4], b"NT");
    radio.reply(&at_response(nt[1], b"NT", 0x00, &[0x05])).await;

    let nd = radio.request().await;
    assert_eq!(&nd[2..4], b"ND");
    for (i, name) in ["PUMP", "VALVE", "METER"].iter().enumerate() {
        radio.reply(&nd_response(nd[1], name, i as u8)).await;
    }
    while seen.lock().unwrap().len() < 3 {
        tokio::task::yield_now().await;
    }

    // NT=5 is 500 ms, plus 100 ms grace.
    tokio::time::advance(Duration::from_millis(599)).await;
    tokio::task::yield_now().await;
    assert!(!discovery.is_finished());

    let nodes = discovery.await.unwrap().unwrap();
    let names: Vec<_> = nodes.iter().map(|n| n.node_identifier.as_str()).collect();
    assert_eq!(names, vec!["PUMP", "VALVE", "METER"]);
    assert_eq!(nodes[1].remote64.as_bytes()[7], 1);

    radio.reply(&nd_response(nd[1], "LATE", 9)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*seen.lock().unwrap(), vec!["PUMP", "VALVE", "METER"]);
    assert_eq!(xbee.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_discovery_fails_without_nt() {
    let (xbee, mut radio) = connect_with(
        XBeeBuilder::new(Module::ZigBee).default_timeout(Duration::from_millis(100)),
    );

    let (result, _) = tokio::join!(
        xbee.discover_nodes(|_| panic!("no window expected")),
        radio.request()
    );
    assert!(result.unwrap_err().is_timeout());
    assert!(radio.is_silent().await);
}

#[tokio::test]
async fn test_write_deferred_until_open() {
    let (client_end, radio_end) = duplex(4096);
    let (transport, signal) = Transport::pending(client_end);
    let xbee = XBeeBuilder::new(Module::ZigBee).connect(transport).unwrap();
    let mut radio = Radio::new(radio_end, ApiMode::Plain);
    assert!(!xbee.is_ready());

    let radio_side = async {
        assert!(radio.is_silent().await);
        signal.open();
        let request = radio.request().await;
        radio.reply(&at_response(request[1], b"VR", 0x00, &[0x21, 0xA7])).await;
    };

    let (result, _) = tokio::join!(xbee.local_command("VR"), radio_side);
    assert_eq!(result.unwrap().as_ref(), &[0x21, 0xA7]);
    assert!(xbee.is_ready());
}

#[tokio::test]
async fn test_close_drains_before_closing() {
    let (client_end, mut radio_end) = duplex(4096);
    let (transport, signal) = Transport::pending(client_end);
    let xbee = XBeeBuilder::new(Module::ZigBee).connect(transport).unwrap();

    let shutdown = async {
        tokio::task::yield_now().await;
        signal.open();
        xbee.close().await
    };

    let (pending, closed) = tokio::join!(xbee.local_command("NI"), shutdown);
    assert!(closed.is_ok());
    assert!(matches!(pending, Err(XBeeError::ConnectionClosed)));

    // The queued request went out whole, then the link closed.
    let mut wire = Vec::new();
    radio_end.read_to_end(&mut wire).await.unwrap();
    let frames = FrameBuffer::new(ApiMode::Plain).push(&wire);
    assert_eq!(frames.len(), 1);
    assert_eq!(&frames[0][2..4], b"NI");

    let err = xbee.local_command("NI").await.unwrap_err();
    assert!(matches!(err, XBeeError::ConnectionClosed));
}

#[tokio::test(start_paused = true)]
async fn test_panicking_discovery_callback_leaves_client_usable() {
    let (xbee, mut radio) = connect_with(
        XBeeBuilder::new(Module::ZigBee).discovery_grace(Duration::from_millis(100)),
    );
    let xbee = Arc::new(xbee);

    let client = xbee.clone();
    let discovery = tokio::spawn(async move {
        client
            .discover_nodes(|node| panic!("callback failed on {}", node.node_identifier))
            .await
    });

    let nt = radio.request().await;
    radio.reply(&at_response(nt[1], b"NT", 0x00, &[0x01])).await;
    let nd = radio.request().await;
    radio.reply(&nd_response(nd[1], "PUMP", 0)).await;

    assert!(discovery.await.unwrap_err().is_panic());
    assert_eq!(xbee.in_flight(), 0);

    let radio_side = async {
        let request = radio.request().await;
        assert_eq!(&request[2..4], b"NI");
        radio.reply(&at_response(request[1], b"NI", 0x00, b"HUB")).await;
    };
    let (result, _) = tokio::join!(xbee.local_command("NI"), radio_side);
    assert_eq!(result.unwrap().as_ref(), b"HUB");
}

#[tokio::test]
async fn test_link_loss_fails_pending_and_new_requests() {
    let (xbee, mut radio) = connect(Module::ZigBee);

    let radio_side = async move {
        let request = radio.request().await;
        assert_eq!(&request[2..4], b"VR");
        drop(radio);
    };

    let (pending, _) = tokio::join!(xbee.local_command("VR"), radio_side);
    assert!(matches!(pending, Err(XBeeError::ConnectionClosed)));

    let err = xbee.local_command("VR").await.unwrap_err();
    assert!(matches!(err, XBeeError::ConnectionClosed));
    assert_eq!(xbee.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_link_loss_ends_discovery() {
    let (xbee, mut radio) = connect(Module::ZigBee);

    let radio_side = async move {
        let nt = radio.request().await;
        radio.reply(&at_response(nt[1], b"NT", 0x00, &[0x3C])).await;
        let nd = radio.request().await;
        radio.reply(&nd_response(nd[1], "PUMP", 0)).await;
        drop(radio);
    };

    let (result, _) = tokio::join!(xbee.discover_nodes(|_| {}), radio_side);
    assert!(matches!(result, Err(XBeeError::ConnectionClosed)));
}
