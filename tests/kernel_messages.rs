//! Kernel boot message scans against realistic boot logs

use consolewatch_core::utils::init_test_logging;
use consolewatch_core::{
    ActionStatus, BootStatus, CollectingSink, Console, IoStream, KernelMessage, KernelMonitor,
    KernelScan, MatchOutcome, Marker, MonitorSettings, ResultEntry,
};
use std::time::Duration;

const BOOT_OK: &[u8] = b"[    0.000000] Booting Linux on physical CPU 0x0\r\n\
[    0.000000] Linux version 6.6.0 (builder@ci) #1 SMP PREEMPT\r\n\
[    1.204211] mmcblk0: mmc0:aaaa SC16G 14.8 GiB\r\n\
[    1.873002] Freeing unused kernel memory: 1024K\r\n\
[    1.880000] Run /sbin/init as init process\r\n";

const BOOT_PANIC: &[u8] = b"[    1.204211] VFS: Cannot open root device \"mmcblk0p2\"\r\n\
[    1.210000] Kernel panic - not syncing: VFS: Unable to mount root fs on unknown-block(0,0)\r\n\
[    1.220000] CPU: 0 PID: 1 Comm: swapper/0 Not tainted 6.6.0 #1\r\n";

async fn scan(monitor: KernelMonitor, chunks: &[&[u8]]) -> (consolewatch_core::KernelReport, CollectingSink) {
    init_test_logging();
    let mut builder = tokio_test::io::Builder::new();
    for chunk in chunks {
        builder.read(chunk);
    }
    let mut stream = IoStream::new("mock", builder.build());
    let sink = CollectingSink::new();
    let report = monitor
        .run(&mut stream, &MonitorSettings::default(), BootStatus::Success, &mut sink.clone())
        .await
        .unwrap();
    (report, sink)
}

#[tokio::test]
async fn clean_boot_passes_on_first_milestone() {
    let (report, sink) = scan(KernelMonitor::new(KernelScan::Boot), &[BOOT_OK]).await;

    assert_eq!(report.status, ActionStatus::Passed);
    assert_eq!(report.events.len(), 1);
    assert_eq!(report.events[0].kind, KernelMessage::FreeUnused);
    assert_eq!(sink.len(), 1);
}

#[tokio::test]
async fn panic_then_close_fails_with_one_event() {
    let (report, sink) = scan(KernelMonitor::default(), &[BOOT_PANIC]).await;

    assert_eq!(report.status, ActionStatus::Failed);
    assert_eq!(report.events.len(), 1);
    assert_eq!(report.events[0].kind, KernelMessage::Panic);
    match &sink.entries()[0] {
        ResultEntry::Kernel(event) => assert!(event.is_failure()),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn repeated_panics_are_all_collected() {
    let (report, _) = scan(KernelMonitor::default(), &[BOOT_PANIC, BOOT_PANIC]).await;

    assert_eq!(report.status, ActionStatus::Failed);
    assert_eq!(report.events.len(), 2);
}

#[tokio::test]
async fn hazard_before_milestone_is_a_failure() {
    let (report, _) = scan(KernelMonitor::default(), &[BOOT_PANIC, BOOT_OK]).await;

    let kinds: Vec<_> = report.events.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![KernelMessage::Panic, KernelMessage::FreeUnused]);
    assert_eq!(report.status, ActionStatus::Failed);
}

#[tokio::test]
async fn init_scan_ignores_free_messages_and_stops_at_prompt() {
    let monitor = KernelMonitor::new(KernelScan::Init).with_prompt(Marker::regex(r"login:\s*$").unwrap());
    let (report, sink) = scan(monitor, &[BOOT_OK, b"\r\nbuildroot login: "]).await;

    assert_eq!(report.status, ActionStatus::Skipped);
    assert!(report.events.is_empty());
    assert!(sink.is_empty());
}

#[tokio::test]
async fn alert_is_acknowledged_before_returning() {
    init_test_logging();
    let mock = tokio_test::io::Builder::new()
        .read(b"Begin: Running /scripts/local-block ... done.\r\n")
        .read(b"ALERT!  UUID=0b5a2e1c does not exist.  Dropping to a shell!\r\n")
        .write(b"#\r\n")
        .build();
    let mut stream = IoStream::new("mock", mock);
    let settings = MonitorSettings::default().with_line_ending(consolewatch_core::LineEnding::CrLf);
    let mut sink = CollectingSink::new();

    let report = KernelMonitor::default()
        .run(&mut stream, &settings, BootStatus::Success, &mut sink)
        .await
        .unwrap();

    assert_eq!(report.status, ActionStatus::Passed);
    assert_eq!(report.events[0].kind, KernelMessage::Alert);
    assert!(report.message.unwrap().starts_with("ALERT!"));
}

#[tokio::test]
async fn login_prompt_after_milestone_reaches_next_stage() {
    init_test_logging();
    let mock = tokio_test::io::Builder::new()
        .read(b"Freeing unused kernel memory: 1024K\r\nbuildroot login: ")
        .build();
    let mut stream = IoStream::new("mock", mock);
    let mut sink = CollectingSink::new();

    let report = KernelMonitor::default()
        .run(&mut stream, &MonitorSettings::default(), BootStatus::Success, &mut sink)
        .await
        .unwrap();
    assert_eq!(report.status, ActionStatus::Passed);

    let mut console = Console::new(&mut stream, MonitorSettings::default());
    let outcome = console
        .wait_for(&Marker::literal("login:"), Duration::from_secs(1))
        .await
        .unwrap();
    assert!(matches!(outcome, MatchOutcome::Label((), _)));
}
