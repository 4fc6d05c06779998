//! End-to-end tests of the host/module rendering protocol.

use linebridge_core::*;
use std::io;
use std::sync::{Arc, Mutex, OnceLock, Weak};
use uuid::Uuid;

const RED_BLUE: &str = include_str!("fixtures/red_blue.wat");
const TRAP_AFTER_FIRST_ROW: &str = include_str!("fixtures/trap_after_first_row.wat");
const GRADIENT: &str = include_str!("../../demos/gradient.wat");

const RED: [u8; 4] = [0xff, 0x00, 0x00, 0xff];
const BLUE: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

fn config(width: u32, height: u32) -> BridgeConfig {
    BridgeConfig {
        raster: Raster::new(width, height),
        ..BridgeConfig::default()
    }
}

fn open(wat: &str, config: BridgeConfig) -> (RenderSession, SharedSurface<Framebuffer>) {
    let surface = Framebuffer::shared(config.raster.width, config.raster.height);
    let binary = ModuleBinary::from_bytes("test", wat);
    let session = RenderSession::with_binary(config, &binary, surface.clone()).unwrap();
    (session, surface)
}

fn open_err(wat: &str) -> BridgeError {
    let binary = ModuleBinary::from_bytes("test", wat);
    match RenderSession::with_binary(config(4, 2), &binary, Framebuffer::new(4, 2)) {
        Ok(_) => panic!("module should have been rejected"),
        Err(err) => err,
    }
}

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_red_over_blue_scenario() {
    let (session, surface) = open(RED_BLUE, config(4, 2));
    let report = session.render().unwrap();

    assert_eq!(report.raster, Raster::new(4, 2));
    assert_eq!(report.lines_painted, 2);
    assert_eq!(report.rows_painted, 2);
    assert!(report.is_clean());

    let fb = surface.lock();
    assert_eq!(fb.row(0).unwrap(), RED.repeat(4).as_slice());
    assert_eq!(fb.row(1).unwrap(), BLUE.repeat(4).as_slice());
    assert_eq!(fb.paint_order(), &[0, 1]);
}

#[test]
fn test_console_log_reaches_host_log() {
    let (session, _surface) = open(GRADIENT, config(4, 2));

    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();

    let report = tracing::subscriber::with_default(subscriber, || session.render()).unwrap();
    assert_eq!(report.log_entries, 1);

    let output = logs.contents();
    let module_lines: Vec<&str> = output
        .lines()
        .filter(|line| line.contains(diagnostics::MODULE_LOG_TARGET))
        .collect();
    assert_eq!(module_lines.len(), 1, "{output}");
    let entry = format!("{}: render start", diagnostics::MODULE_LOG_TARGET);
    assert!(module_lines[0].contains(&entry), "{output}");
}

#[test]
fn test_trap_keeps_rows_already_painted() {
    let (session, surface) = open(TRAP_AFTER_FIRST_ROW, config(4, 2));

    match session.render() {
        Err(BridgeError::RenderAborted { rows_painted, .. }) => assert_eq!(rows_painted, 1),
        other => panic!("expected RenderAborted, got {other:?}"),
    }

    let fb = surface.lock();
    assert_eq!(fb.row(0).unwrap(), RED.repeat(4).as_slice());
    assert!(fb.is_painted(0));
    assert!(!fb.is_painted(1));
}

#[test]
fn test_rows_arrive_top_to_bottom() {
    let (width, height) = (5, 8);
    let (session, surface) = open(GRADIENT, config(width, height));
    let report = session.render().unwrap();
    assert_eq!(report.lines_painted, height as usize);

    let fb = surface.lock();
    assert_eq!(fb.paint_order(), (0..height).collect::<Vec<_>>().as_slice());
    for y in 0..height {
        for x in 0..width {
            let expected = [
                (x * 255 / width) as u8,
                (y * 255 / height) as u8,
                0x80,
                0xff,
            ];
            assert_eq!(fb.pixel(x, y), Some(expected), "pixel ({x}, {y})");
        }
    }
}

#[test]
fn test_replayed_line_paints_identically() {
    let wat = r#"(module
        (import "env" "memory" (memory 2 2))
        (import "env" "renderLine" (func $line (param i32 i32 i32)))
        (data (i32.const 0) "\01\02\03\04\05\06\07\08\09\0a\0b\0c\0d\0e\0f\10")
        (func (export "render") (param i32 i32)
            (call $line (i32.const 0) (i32.const 0) (i32.const 16))
            (call $line (i32.const 0) (i32.const 0) (i32.const 16))))"#;
    let (session, surface) = open(wat, config(4, 1));
    let report = session.render().unwrap();

    assert_eq!(report.lines_painted, 2);
    assert_eq!(report.rows_painted, 1);
    let fb = surface.lock();
    assert_eq!(fb.paint_order(), &[0, 0]);
    assert_eq!(fb.row(0).unwrap(), (1u8..=16).collect::<Vec<_>>().as_slice());
}

#[test]
fn test_abort_counts_distinct_rows() {
    let wat = r#"(module
        (import "env" "memory" (memory 2 2))
        (import "env" "renderLine" (func $line (param i32 i32 i32)))
        (func (export "render") (param i32 i32)
            (call $line (i32.const 0) (i32.const 0) (i32.const 16))
            (call $line (i32.const 0) (i32.const 0) (i32.const 16))
            unreachable))"#;
    let (session, surface) = open(wat, config(4, 2));

    match session.render() {
        Err(BridgeError::RenderAborted { rows_painted, .. }) => assert_eq!(rows_painted, 1),
        other => panic!("expected RenderAborted, got {other:?}"),
    }
    assert_eq!(surface.lock().painted_rows(), 1);
}

#[test]
fn test_row_equal_to_height_aborts_render() {
    let wat = r#"(module
        (import "env" "memory" (memory 2 2))
        (import "env" "renderLine" (func $line (param i32 i32 i32)))
        (func (export "render") (param $w i32) (param $h i32)
            (call $line (i32.const 0) (i32.const 0) (i32.const 16))
            (call $line (local.get $h) (i32.const 0) (i32.const 16))
            (call $line (i32.const 1) (i32.const 0) (i32.const 16))))"#;
    let (session, surface) = open(wat, config(4, 2));

    match session.render() {
        Err(BridgeError::OutOfRangeAccess(AccessViolation::Row { row, height })) => {
            assert_eq!((row, height), (2, 2));
        }
        other => panic!("expected OutOfRangeAccess, got {other:?}"),
    }
    let fb = surface.lock();
    assert!(fb.is_painted(0));
    assert!(!fb.is_painted(1));
}

#[test]
fn test_range_past_arena_aborts_render() {
    // Two pages hold 131072 bytes; 131064 + 16 runs 8 bytes past the end.
    let wat = r#"(module
        (import "env" "memory" (memory 2 2))
        (import "env" "renderLine" (func $line (param i32 i32 i32)))
        (func (export "render") (param i32 i32)
            (call $line (i32.const 0) (i32.const 131064) (i32.const 16))
            (call $line (i32.const 1) (i32.const 0) (i32.const 16))))"#;
    let (session, surface) = open(wat, config(4, 2));

    match session.render() {
        Err(BridgeError::OutOfRangeAccess(AccessViolation::Arena {
            offset,
            length,
            capacity,
        })) => {
            assert_eq!((offset, length, capacity), (131_064, 16, 131_072));
        }
        other => panic!("expected OutOfRangeAccess, got {other:?}"),
    }
    assert_eq!(surface.lock().painted_rows(), 0);
}

#[test]
fn test_malformed_line_is_dropped_and_render_continues() {
    let wat = r#"(module
        (import "env" "memory" (memory 2 2))
        (import "env" "renderLine" (func $line (param i32 i32 i32)))
        (data (i32.const 0) "\ff\ff\ff\ff\ff\ff\ff\ff\ff\ff\ff\ff\ff\ff\ff\ff")
        (func (export "render") (param i32 i32)
            (call $line (i32.const 0) (i32.const 0) (i32.const 12))
            (call $line (i32.const 1) (i32.const 0) (i32.const 16))))"#;
    let (session, surface) = open(wat, config(4, 2));
    let report = session.render().unwrap();

    assert!(!report.is_clean());
    assert_eq!(
        report.rejected,
        vec![RejectedScanline {
            row: 0,
            expected: 16,
            actual: 12
        }]
    );
    assert_eq!(report.lines_painted, 1);

    let fb = surface.lock();
    assert!(!fb.is_painted(0));
    assert_eq!(fb.row(1).unwrap(), &[0xff; 16]);
}

#[test]
fn test_out_of_order_rows_are_accepted() {
    let wat = r#"(module
        (import "env" "memory" (memory 2 2))
        (import "env" "renderLine" (func $line (param i32 i32 i32)))
        (data (i32.const 0) "\aa\aa\aa\aa")
        (data (i32.const 4) "\bb\bb\bb\bb")
        (func (export "render") (param i32 i32)
            (call $line (i32.const 1) (i32.const 0) (i32.const 4))
            (call $line (i32.const 0) (i32.const 0) (i32.const 4))
            (call $line (i32.const 1) (i32.const 4) (i32.const 4))))"#;
    let (session, surface) = open(wat, config(1, 2));
    session.render().unwrap();

    let fb = surface.lock();
    assert_eq!(fb.paint_order(), &[1, 0, 1]);
    assert_eq!(fb.pixel(0, 0), Some([0xaa; 4]));
    assert_eq!(fb.pixel(0, 1), Some([0xbb; 4]));
}

#[test]
fn test_console_log_out_of_range_is_fatal() {
    let wat = r#"(module
        (import "env" "memory" (memory 2 2))
        (import "env" "consoleLog" (func $log (param i32 i32)))
        (func (export "render") (param i32 i32)
            (call $log (i32.const 131070) (i32.const 4))))"#;
    let (session, _surface) = open(wat, config(4, 2));
    assert!(matches!(
        session.render(),
        Err(BridgeError::OutOfRangeAccess(AccessViolation::Arena { .. }))
    ));
}

#[test]
fn test_undecodable_diagnostics_do_not_fail_render() {
    let wat = r#"(module
        (import "env" "memory" (memory 2 2))
        (import "env" "consoleLog" (func $log (param i32 i32)))
        (data (i32.const 0) "\ff\fe\fd")
        (func (export "render") (param i32 i32)
            (call $log (i32.const 0) (i32.const 3))))"#;
    let (session, _surface) = open(wat, config(4, 2));
    let report = session.render().unwrap();
    assert_eq!(report.log_entries, 1);
    assert_eq!(report.lines_painted, 0);
}

#[test]
fn test_incompatible_modules_fail_instantiation() {
    let foreign_import = r#"(module
        (import "env" "memory" (memory 2 2))
        (import "env" "fetch" (func (param i32 i32)))
        (func (export "render") (param i32 i32)))"#;
    let memory_too_large = r#"(module
        (import "env" "memory" (memory 4 4))
        (func (export "render") (param i32 i32)))"#;
    let missing_entry = r#"(module
        (import "env" "memory" (memory 2 2))
        (func (export "draw") (param i32 i32)))"#;
    let not_wasm = "this is not a module";

    for wat in [foreign_import, memory_too_large, missing_entry, not_wasm] {
        assert!(
            matches!(open_err(wat), BridgeError::Instantiation(_)),
            "{wat}"
        );
    }
}

#[test]
fn test_scanline_during_start_fails_instantiation() {
    let wat = r#"(module
        (import "env" "memory" (memory 2 2))
        (import "env" "renderLine" (func $line (param i32 i32 i32)))
        (func $init (call $line (i32.const 0) (i32.const 0) (i32.const 16)))
        (start $init)
        (func (export "render") (param i32 i32)))"#;
    let err = open_err(wat);
    assert!(matches!(err, BridgeError::Instantiation(_)));
    assert!(err.to_string().contains("outside of a render"), "{err}");
}

#[test]
fn test_raster_wider_than_arena_is_refused() {
    let (session, surface) = open(RED_BLUE, config(4, 2));
    let result = session.render_with(Raster::new(40_000, 1));
    assert!(matches!(result, Err(BridgeError::InvalidRaster(_))));
    assert_eq!(surface.lock().painted_rows(), 0);
}

#[test]
fn test_raster_not_matching_surface_is_refused() {
    let (session, surface) = open(GRADIENT, config(4, 2));

    match session.render_with(Raster::new(2, 2)) {
        Err(BridgeError::InvalidRaster(reason)) => assert!(reason.contains("4x2"), "{reason}"),
        other => panic!("expected InvalidRaster, got {other:?}"),
    }
    assert_eq!(surface.lock().painted_rows(), 0);

    // The configured raster still renders.
    let report = session.render().unwrap();
    assert_eq!(report.rows_painted, 2);
}

#[test]
fn test_fuel_exhaustion_aborts_render() {
    let wat = r#"(module
        (import "env" "memory" (memory 2 2))
        (func (export "render") (param i32 i32)
            (loop $spin (br $spin))))"#;
    let mut config = config(4, 2);
    config.limits.fuel = Some(10_000);
    let (session, _surface) = open(wat, config);

    match session.render() {
        Err(BridgeError::RenderAborted { rows_painted, .. }) => assert_eq!(rows_painted, 0),
        other => panic!("expected RenderAborted, got {other:?}"),
    }
}

#[test]
fn test_session_renders_again_after_abort() {
    let (session, surface) = open(TRAP_AFTER_FIRST_ROW, config(4, 2));
    assert!(session.render().is_err());
    assert!(matches!(
        session.render(),
        Err(BridgeError::RenderAborted { rows_painted: 1, .. })
    ));
    assert_eq!(surface.lock().paint_order(), &[0, 0]);
}

#[test]
fn test_sessions_are_independent() {
    let (first, first_surface) = open(RED_BLUE, config(4, 2));
    let (second, second_surface) = open(GRADIENT, config(4, 2));
    assert_ne!(first.id(), second.id());

    first.render().unwrap();
    assert_eq!(second_surface.lock().painted_rows(), 0);

    second.render().unwrap();
    assert_eq!(first_surface.lock().pixel(0, 1), Some(BLUE));
    assert_eq!(second_surface.lock().pixel(0, 0), Some([0, 0, 0x80, 0xff]));
}

struct Reentrant {
    handle: Arc<OnceLock<Weak<ModuleHandle>>>,
    outcomes: Arc<Mutex<Vec<bool>>>,
}

impl ScanlineConsumer for Reentrant {
    fn on_line(&mut self, _raster: Raster, _arena: ArenaView<'_>, _record: ScanlineRecord) -> Result<()> {
        if let Some(handle) = self.handle.get().and_then(Weak::upgrade) {
            let refused = matches!(handle.render(4, 2), Err(BridgeError::RenderInProgress));
            self.outcomes.lock().unwrap().push(refused);
        }
        Ok(())
    }
}

#[test]
fn test_overlapping_render_is_refused() {
    let slot: Arc<OnceLock<Weak<ModuleHandle>>> = Arc::default();
    let outcomes = Arc::new(Mutex::new(Vec::new()));

    let host = ModuleHost::new(LimitsConfig::default()).unwrap();
    let session_id = Uuid::new_v4();
    let handle = host
        .instantiate(
            session_id,
            &ModuleBinary::from_bytes("red_blue", RED_BLUE),
            ArenaConfig::default(),
            Reentrant {
                handle: slot.clone(),
                outcomes: outcomes.clone(),
            },
            DiagnosticsSink::new(session_id, "red_blue"),
        )
        .map(Arc::new)
        .unwrap();
    assert!(slot.set(Arc::downgrade(&handle)).is_ok());

    let report = handle.render(4, 2).unwrap();
    assert_eq!(report.lines_painted, 2);
    assert_eq!(*outcomes.lock().unwrap(), vec![true, true]);
}

#[tokio::test]
async fn test_open_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("red_blue.wat"), RED_BLUE).unwrap();
    let config_path = dir.path().join("bridge.toml");
    std::fs::write(
        &config_path,
        "[module]\npath = \"red_blue.wat\"\n\n[raster]\nwidth = 4\nheight = 2\n",
    )
    .unwrap();

    let config = BridgeConfig::from_file(&config_path).await.unwrap();
    let surface = Framebuffer::shared(4, 2);
    let session = RenderSession::open(config, surface.clone()).await.unwrap();
    assert_eq!(session.handle().name(), "red_blue");

    session.render().unwrap();
    assert_eq!(surface.lock().pixel(3, 0), Some(RED));
}

#[tokio::test]
async fn test_open_without_module_path() {
    let result = RenderSession::open(config(4, 2), Framebuffer::new(4, 2)).await;
    assert!(matches!(result, Err(BridgeError::Config(_))));
}
