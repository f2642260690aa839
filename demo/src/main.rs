//! Wiring example: boots a `SystemCore`, registers a couple of services
//! with a dependency edge between them, subscribes a handler, posts
//! events at each priority tier, and loads one app through the app
//! manager. Useful as a smoke test and as the thing to read first to see
//! every module in the runtime exercised together.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use abi::{AppSource, CoreError, Limits, Priority, QuotaLimits};
use apps::{AppContext, AppManager, AppManifest};
use runtime_client::{Client, Event};

fn entry(_ctx: &AppContext) -> Result<(), CoreError> {
    log::info!("blink app started");
    Ok(())
}

fn exit(_ctx: &AppContext) -> Result<(), CoreError> {
    log::info!("blink app stopped");
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let client = Client::start(Limits::default()).expect("system boots");

    let sensors = client
        .register("sensors", Arc::new(()), QuotaLimits::default())
        .expect("register sensors");
    let logger = client
        .register("logger", Arc::new(()), QuotaLimits::default())
        .expect("register logger");

    // `logger` has to be up before `sensors` starts posting, so sensors
    // depends on it.
    client.add_dependency(sensors.id(), logger.id()).expect("declare dependency");
    let order = client.get_init_order();
    log::info!("init order: {:?}", order);

    let event_type = client.register_type("sensors.reading").expect("register type");

    let received = Arc::new(AtomicUsize::new(0));
    let received_for_handler = received.clone();
    logger
        .subscribe(
            event_type,
            Arc::new(move |ev: &Event<'_>, _| {
                received_for_handler.fetch_add(1, Ordering::SeqCst);
                log::info!("logger saw {} bytes on seq {}", ev.payload.len(), ev.sequence);
            }),
            Arc::new(()),
        )
        .expect("subscribe");

    logger.set_state(abi::ServiceState::Registered).expect("logger registered");
    logger.set_state(abi::ServiceState::Running).expect("logger running");
    sensors.set_state(abi::ServiceState::Registered).expect("sensors registered");
    sensors.set_state(abi::ServiceState::Running).expect("sensors running");

    sensors.post(event_type, b"23.5C", Priority::Normal).expect("post normal");
    sensors.post(event_type, b"URGENT", Priority::Critical).expect("post critical");

    std::thread::sleep(Duration::from_millis(50));
    log::info!("events observed by logger: {}", received.load(Ordering::SeqCst));

    let manager = AppManager::new(client.core().clone(), Limits::default().max_apps);
    let manifest = AppManifest {
        name: "blink".to_string(),
        version: "0.1.0".to_string(),
        author: "demo".to_string(),
        entry,
        exit,
        user_data: Arc::new(()),
        source: AppSource::Internal,
    };
    manager.register_app(manifest).expect("register app");
    manager.start_app("blink").expect("start app");
    manager.stop_app("blink").expect("stop app");

    let stats = client.get_stats().expect("stats available");
    log::info!("final stats: {:?}", stats);

    client.stop().expect("stop cleanly");
}
