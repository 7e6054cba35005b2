//! Needs a running session bus, run with `cargo test -- --ignored`

use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;
use unique_app::AppId;
use unique_app::Application;
use unique_app::ApplicationImpl;
use unique_app::ApplicationOptions;
use unique_app::CommandLine;
use unique_app::NoHooks;
use unique_app::PlatformData;
use unique_app::dbus::DBusNamespace;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn unique_app_id() -> AppId {
    AppId::from_unique_key(&format!("session-bus-test-{}", std::process::id()))
}

#[test]
#[ignore]
fn test_second_connection_forwards_to_first() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let app_id = unique_app_id();

    let (tx, calls) = mpsc::channel();
    let mut primary = ApplicationImpl::register(
        Arc::new(DBusNamespace::session()?),
        app_id.clone(),
        ApplicationOptions::default(),
        move |call| {
            let _ = tx.send(call);
        },
    )?;
    assert!(primary.is_primary());

    let mut secondary = ApplicationImpl::register(
        Arc::new(DBusNamespace::session()?),
        app_id,
        ApplicationOptions {
            command_line_timeout: Duration::from_secs(10),
            ..Default::default()
        },
        |_| {},
    )?;
    assert!(secondary.is_remote());

    secondary.activate(&PlatformData::empty())?;
    let call = calls.recv_timeout(Duration::from_secs(5))?;
    assert_eq!(call.name(), "activate");

    struct Exits3;
    impl Application for Exits3 {
        fn command_line(&mut self, command_line: &mut CommandLine) -> i32 {
            command_line.print("over the bus\n");
            3
        }
    }

    let event_loop = std::thread::spawn(move || {
        let call = calls.recv_timeout(Duration::from_secs(5)).unwrap();
        call.run(&mut Exits3, &NoHooks);
    });
    let status = secondary.command_line(["prog", "--flag"], &PlatformData::empty());
    event_loop.join().unwrap();
    assert_eq!(status, 3);

    secondary.destroy();
    primary.destroy();
    primary.destroy();
    Ok(())
}
