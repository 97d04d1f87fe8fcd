use ecco_link::dispatch::handlers::{self, DeviceInfoHandler, StorageHandlers};
use ecco_link::dispatch::{handler_fn, Dispatcher, Reply};
use ecco_link::protocol::Status;
use ecco_link::tools::{IrCapture, NfcTag, NfcTagType, RfidTagType};
use ecco_link::{Command, LinkConfig, SerialError, SessionBuilder, StreamTransport, ToolClient};

fn client_for(dispatcher: Dispatcher) -> ToolClient {
    let (controller, peripheral) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move { dispatcher.serve(StreamTransport::new(peripheral)).await });

    let config = LinkConfig {
        default_timeout_ms: 1000,
        capture_timeout_ms: 2000,
        ..LinkConfig::default()
    };
    let session = SessionBuilder::new(StreamTransport::new(controller)).config(&config).build();
    ToolClient::new(session, config)
}

/// A peripheral that replays canned captures.
fn fake_peripheral() -> Dispatcher {
    let mut d = Dispatcher::new();
    d.register(Command::Ping, handlers::ping());
    d.register(Command::DeviceInfo, DeviceInfoHandler::new([1, 4, 2], "Ecco Bench"));

    d.register(Command::SubGhzCapture, handler_fn(|req| {
        if req.len() < 6 {
            return Reply::error(Status::Invalid);
        }
        let mut out = vec![12, 0];
        for t in [400i32, -800, 400] {
            out.extend_from_slice(&t.to_le_bytes());
        }
        Reply::ok(out)
    }));
    d.register(Command::SubGhzTransmit, handler_fn(|req| {
        if req.len() < 6 {
            return Reply::error(Status::Invalid);
        }
        let data_len = u16::from_le_bytes([req[4], req[5]]) as usize;
        if req.len() < 6 + data_len {
            Reply::error(Status::Invalid)
        } else {
            Reply::empty()
        }
    }));
    d.register(Command::NfcRead, handler_fn(|_| Reply::ok(vec![1, 4, 0xDE, 0xAD, 0xBE, 0xEF])));
    d.register(Command::NfcEmulate, handler_fn(|req| {
        if req.len() < 3 {
            Reply::error(Status::Invalid)
        } else {
            Reply::empty()
        }
    }));
    d.register(Command::IrReceive, handler_fn(|_| Reply::error(Status::Timeout)));
    d.register(Command::IrTransmit, handler_fn(|req| {
        if req.len() < 3 {
            Reply::error(Status::Invalid)
        } else {
            Reply::empty()
        }
    }));
    d.register(Command::RfidRead, handler_fn(|_| Reply::ok(vec![2, 0x00, 0x12, 0x34, 0x56, 0x78])));
    d
}

#[tokio::test]
async fn ping_and_identity() {
    let client = client_for(fake_peripheral());
    client.ping().await.unwrap();

    let info = client.device_info().await.unwrap();
    assert_eq!(info.firmware_version, "1.4.2");
    assert_eq!(info.name, "Ecco Bench");
}

#[tokio::test]
async fn subghz_capture_and_replay() {
    let client = client_for(fake_peripheral());

    let capture = client.subghz_capture(433_920_000, 5).await.unwrap();
    assert_eq!(capture.frequency_hz, 433_920_000);
    assert_eq!(capture.timings, vec![400, -800, 400]);

    client
        .subghz_transmit(capture.frequency_hz, &capture.timings)
        .await
        .unwrap();
}

#[tokio::test]
async fn nfc_read_and_emulate() {
    let client = client_for(fake_peripheral());

    let tag = client.nfc_read(3).await.unwrap();
    assert_eq!(tag.tag_type, NfcTagType::MifareClassic);
    assert_eq!(tag.uid, vec![0xDE, 0xAD, 0xBE, 0xEF]);
    assert_eq!(tag.uid_hex, "DEADBEEF");

    client.nfc_emulate(&tag).await.unwrap();
    client
        .nfc_emulate(&NfcTag::new(NfcTagType::Other(4), vec![0x01]))
        .await
        .unwrap();
}

#[tokio::test]
async fn ir_timeout_is_reported_by_device() {
    let client = client_for(fake_peripheral());

    let err = client.ir_receive(1).await.unwrap_err();
    assert!(matches!(err, SerialError::Device(Status::Timeout)));
    assert!(err.is_timeout());

    let capture = IrCapture {
        protocol: 0,
        timings: vec![9000, 4500, 560, 560],
    };
    client.ir_transmit(&capture).await.unwrap();
}

#[tokio::test]
async fn rfid_read() {
    let client = client_for(fake_peripheral());
    let tag = client.rfid_read(2).await.unwrap();
    assert_eq!(tag.tag_type, RfidTagType::HidProx);
    assert_eq!(tag.data_hex, "0012345678");
}

#[tokio::test]
async fn models_serialize_for_callers() {
    let client = client_for(fake_peripheral());
    let tag = client.nfc_read(3).await.unwrap();
    let json = serde_json::to_value(&tag).unwrap();
    assert_eq!(json["uid_hex"], "DEADBEEF");
    assert_eq!(json["tag_type"], "mifare_classic");
}

#[tokio::test]
async fn storage_listing_is_sorted() {
    let root = std::env::temp_dir().join(format!("ecco-link-list-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&root);
    std::fs::create_dir_all(root.join("ext/infrared")).unwrap();
    std::fs::write(root.join("ext/b.sub"), b"1").unwrap();
    std::fs::write(root.join("ext/a.nfc"), b"2").unwrap();

    let mut dispatcher = Dispatcher::new();
    StorageHandlers::new(root.clone()).install(&mut dispatcher);
    let client = client_for(dispatcher);

    let listing = client.storage_list("/ext").await.unwrap();
    assert_eq!(listing.path, "/ext");
    assert_eq!(listing.entries, vec!["a.nfc", "b.sub", "infrared"]);

    let err = client.storage_list("/ext/../..").await.unwrap_err();
    assert!(matches!(err, SerialError::Device(Status::Invalid)));

    let err = client.storage_list("/missing").await.unwrap_err();
    assert!(matches!(err, SerialError::Device(Status::NotFound)));

    let _ = std::fs::remove_dir_all(root);
}

#[tokio::test]
async fn huge_capture_timeout_from_config() {
    let (controller, peripheral) = tokio::io::duplex(64 * 1024);
    let dispatcher = fake_peripheral();
    tokio::spawn(async move { dispatcher.serve(StreamTransport::new(peripheral)).await });

    let config = LinkConfig {
        capture_timeout_ms: u64::MAX,
        ..LinkConfig::default()
    };
    let session = SessionBuilder::new(StreamTransport::new(controller)).config(&config).build();
    let client = ToolClient::new(session, config);

    client.nfc_read(3).await.unwrap();
    client.ping().await.unwrap();
    assert!(!client.session().is_closed());
}
