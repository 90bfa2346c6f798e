//! End-to-end poll cycles against a scripted printer

mod common;

use common::{MockTransport, api, object_response, status_path, status_response};
use krusty_overlay::client::{MoonrakerApi, TransportError};
use krusty_overlay::poll::{ErrorKind, PollOptions, PollOutcome, StatusPoller};
use krusty_overlay::telemetry::PrintState;
use krusty_overlay::view::OverlayView;
use serde_json::json;

const ADDRESS: &str = "192.168.1.50";

fn poller(transport: &MockTransport) -> StatusPoller<MockTransport> {
    StatusPoller::new(api(transport), ADDRESS, PollOptions::default())
}

fn no_chamber(transport: &MockTransport) -> StatusPoller<MockTransport> {
    let options = PollOptions {
        chamber: false,
        ..PollOptions::default()
    };
    StatusPoller::new(api(transport), ADDRESS, options)
}

const THUMB_HEAD: &str = "\
; generated by PrusaSlicer 2.7.1
; thumbnail begin 16x16 12
; iVBORw0KGgoA
; thumbnail end
; layer_height = 0.2
G28
";

#[tokio::test]
async fn test_printing_without_metadata() {
    let transport = MockTransport::new();
    transport.on_json(status_path(), status_response("printing", "part.gcode", 0.5, 1800.0));
    let poller = no_chamber(&transport);

    let outcome = poller.poll_once().await;
    let PollOutcome::Status(status) = &outcome else {
        panic!("expected a status, got {outcome:?}");
    };
    assert_eq!(status.state, PrintState::Printing);
    assert_eq!(status.percentage, 50.0);
    assert_eq!(status.times.remaining_estimate, Some(1800.0));
    assert_eq!(status.times.remaining_slicer, None);
    assert_eq!(status.filename.as_deref(), Some("part.gcode"));

    let mut view = OverlayView::new("Voron");
    view.apply(&outcome);
    assert_eq!(view.status, "Printing");
    assert_eq!(view.progress, "50%");
    assert_eq!(view.time_estimate, "30m");
    assert_eq!(view.time_slicer, "--");
    assert_eq!(view.time_elapsed, "30m");
    assert_eq!(view.layers, "--");
    assert_eq!(view.hotend, "215°C / 215°C");
    assert_eq!(view.bed, "60°C / 60°C");
    assert_eq!(view.filename, "part.gcode");
    assert!(!view.thumbnail_visible);
}

#[tokio::test]
async fn test_printing_with_api_metadata() {
    let transport = MockTransport::new();
    let mut response = status_response("printing", "/home/pi/printer_data/gcodes/benchy.gcode", 0.25, 900.0);
    response["result"]["status"]["toolhead"]["position"] = json!([0.0, 0.0, 10.3, 0.0]);
    transport.on_json(status_path(), response);
    transport.on_json(
        MoonrakerApi::<MockTransport>::metadata_path("benchy.gcode"),
        json!({"result": {
            "layer_height": 0.2,
            "first_layer_height": 0.3,
            "object_height": 50.0,
            "estimated_time": 3600
        }}),
    );
    let poller = no_chamber(&transport);

    let mut view = OverlayView::new("Voron");
    view.apply(&poller.poll_once().await);
    assert_eq!(view.layers, "51 / 249");
    assert_eq!(view.time_slicer, "45m");
    assert_eq!(view.time_estimate, "45m");
    assert_eq!(view.filename, "benchy.gcode");
}

#[tokio::test]
async fn test_idle_printer() {
    let transport = MockTransport::new();
    transport.on_json(status_path(), status_response("standby", "", 0.0, 0.0));
    let poller = no_chamber(&transport);

    let mut view = OverlayView::new("Voron");
    view.apply(&poller.poll_once().await);
    assert_eq!(view.status, "Standby");
    assert_eq!(view.progress, "0%");
    assert_eq!(view.layers, "--");
    assert_eq!(view.time_estimate, "--");
    assert_eq!(view.filename, "--");
    assert!(!view.error);
    assert_eq!(transport.calls(), vec![status_path()]);
}

#[tokio::test]
async fn test_paused_uses_cached_metadata_only() {
    let transport = MockTransport::new();
    transport.on_json(
        MoonrakerApi::<MockTransport>::metadata_path("part.gcode"),
        json!({"result": {"estimated_time": 3600}}),
    );
    transport.on_json(status_path(), status_response("printing", "part.gcode", 0.5, 1200.0));
    let poller = no_chamber(&transport);
    poller.poll_once().await;

    transport.on_json(status_path(), status_response("paused", "part.gcode", 0.5, 1200.0));
    transport.clear_calls();
    let mut view = OverlayView::new("Voron");
    view.apply(&poller.poll_once().await);

    assert_eq!(transport.calls(), vec![status_path()]);
    assert_eq!(view.status, "Paused");
    assert_eq!(view.progress, "50%");
    assert_eq!(view.time_slicer, "40m");
    assert_eq!(view.time_estimate, "--");
    assert!(!view.thumbnail_visible);
}

#[tokio::test]
async fn test_unreachable_keeps_temperatures() {
    let transport = MockTransport::new();
    transport.on_json(status_path(), status_response("printing", "part.gcode", 0.5, 1800.0));
    transport.on_bytes(MoonrakerApi::<MockTransport>::file_path("gcodes/part.gcode"), THUMB_HEAD);
    let poller = no_chamber(&transport);

    let mut view = OverlayView::new("Voron");
    view.apply(&poller.poll_once().await);
    assert!(view.thumbnail_visible);
    assert_eq!(view.thumbnail.as_deref(), Some("data:image/png;base64,iVBORw0KGgoA"));

    transport.on_error(status_path(), TransportError::Connect("connection refused".into()));
    let outcome = poller.poll_once().await;
    match &outcome {
        PollOutcome::Error(err) => {
            assert_eq!(err.kind, ErrorKind::Unreachable);
            assert!(err.retryable);
        }
        other => panic!("expected an error, got {other:?}"),
    }
    view.apply(&outcome);
    assert!(view.error);
    assert_eq!(view.status, "Unreachable: 192.168.1.50");
    assert_eq!(view.progress, "0%");
    assert_eq!(view.layers, "--");
    assert!(!view.thumbnail_visible);
    assert_eq!(view.thumbnail, None);
    assert_eq!(view.hotend, "215°C / 215°C");
    assert_eq!(view.filename, "part.gcode");
}

#[tokio::test]
async fn test_malformed_status_is_decode_error() {
    let transport = MockTransport::new();
    transport.on_json(status_path(), json!({"error": "nope"}));
    let outcome = no_chamber(&transport).poll_once().await;
    match outcome {
        PollOutcome::Error(err) => {
            assert_eq!(err.kind, ErrorKind::Connection);
            assert!(!err.retryable);
        }
        other => panic!("expected an error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_thumbnail_fetched_once_per_file() {
    let transport = MockTransport::new();
    let head_path = MoonrakerApi::<MockTransport>::file_path("gcodes/part.gcode");
    transport.on_json(status_path(), status_response("printing", "part.gcode", 0.1, 60.0));
    transport.on_bytes(head_path.clone(), THUMB_HEAD);
    let poller = no_chamber(&transport);

    for _ in 0..3 {
        let outcome = poller.poll_once().await;
        let PollOutcome::Status(status) = outcome else {
            panic!("expected a status");
        };
        let thumb = status.thumbnail.expect("thumbnail");
        assert_eq!(thumb.base64, "iVBORw0KGgoA");
        assert_eq!((thumb.width, thumb.height), (16, 16));
    }
    // One header read for metadata, one for the thumbnail.
    assert_eq!(transport.count(&head_path), 2);
}

#[tokio::test]
async fn test_chamber_reading_included() {
    let transport = MockTransport::new();
    transport.on_json(status_path(), status_response("standby", "", 0.0, 0.0));
    transport.on_json("/printer/objects/list", json!({"result": {"objects": ["temperature_sensor chamber"]}}));
    transport.on_json(
        MoonrakerApi::<MockTransport>::object_query_path("temperature_sensor chamber"),
        object_response("temperature_sensor chamber", json!({"temperature": 41.6})),
    );
    let poller = poller(&transport);

    let mut view = OverlayView::new("Voron");
    view.apply(&poller.poll_once().await);
    assert_eq!(view.chamber, "42°C / 42°C");
}

#[tokio::test]
async fn test_filename_conventions_without_metadata_endpoint() {
    let transport = MockTransport::new();
    transport.on_json(status_path(), status_response("printing", "benchy_0.2mm_PLA_1h46m.gcode", 0.5, 1800.0));
    let poller = no_chamber(&transport);

    let mut view = OverlayView::new("Voron");
    view.apply(&poller.poll_once().await);
    assert_eq!(view.time_slicer, "1h 16m");
    assert_eq!(view.time_estimate, "30m");
    // Layer height is known but not the object height, so there is no total.
    assert_eq!(view.layers, "1 / --");
}
