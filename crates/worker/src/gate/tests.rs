use std::sync::atomic::AtomicUsize;

use tokio::time::{Instant, sleep, timeout};
use weft_config::DebouncePolicy;

use super::*;

const WINDOW: Duration = Duration::from_millis(500);

fn gate(options: &Arc<OptionContext>, fired: &Arc<AtomicUsize>) -> DelayGate {
	let fired = Arc::clone(fired);
	let spec = GateSpec::new("symbols", "symbol_search", ["suggest_imports", "workspace_symbols"]);
	DelayGate::new(spec, Arc::clone(options), move |_cancel| async move {
		fired.fetch_add(1, Ordering::SeqCst);
	})
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn opens_when_global_and_scope_options_hold() {
	let options = Arc::new(OptionContext::new());
	let fired = Arc::new(AtomicUsize::new(0));
	let gate = gate(&options, &fired);

	options.set_global("symbol_search", true);
	options.set_scoped("rust", "workspace_symbols", true);
	gate.register_scope("rust");

	let start = Instant::now();
	gate.activated().await;
	assert_eq!(start.elapsed(), WINDOW);
	assert!(gate.is_activated());

	sleep(Duration::from_millis(1)).await;
	assert_eq!(fired.load(Ordering::SeqCst), 1);
	assert_eq!(options.listener_count(), 0);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn global_option_blocks_activation() {
	let options = Arc::new(OptionContext::new());
	let fired = Arc::new(AtomicUsize::new(0));
	let gate = gate(&options, &fired);

	options.set_scoped("rust", "suggest_imports", true);
	gate.register_scope("rust");
	sleep(WINDOW * 4).await;

	assert!(!gate.is_activated());
	assert_eq!(fired.load(Ordering::SeqCst), 0);
	assert_eq!(options.listener_count(), 1);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn unregistered_scopes_do_not_count() {
	let options = Arc::new(OptionContext::new());
	let fired = Arc::new(AtomicUsize::new(0));
	let gate = gate(&options, &fired);

	options.set_global("symbol_search", true);
	options.set_scoped("python", "suggest_imports", true);
	gate.register_scope("rust");
	sleep(WINDOW * 4).await;
	assert!(!gate.is_activated());

	gate.register_scope("python");
	timeout(WINDOW * 2, gate.activated()).await.unwrap();
	assert_eq!(gate.scopes(), vec!["python", "rust"]);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn option_change_reevaluates() {
	let options = Arc::new(OptionContext::new());
	let fired = Arc::new(AtomicUsize::new(0));
	let gate = gate(&options, &fired);

	gate.register_scope("rust");
	sleep(WINDOW * 2).await;
	assert!(!gate.is_activated());

	// No explicit call: the gate hears these through its subscription.
	options.set_global("symbol_search", true);
	options.set_scoped("rust", "suggest_imports", true);
	timeout(WINDOW * 2, gate.activated()).await.unwrap();
	sleep(Duration::from_millis(1)).await;
	assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn action_fires_exactly_once() {
	let options = Arc::new(OptionContext::new());
	let fired = Arc::new(AtomicUsize::new(0));
	let gate = gate(&options, &fired);

	options.set_global("symbol_search", true);
	options.set_scoped("rust", "suggest_imports", true);
	gate.register_scope("rust");
	gate.activated().await;

	for i in 0..10 {
		gate.register_scope(format!("scope{i}"));
		gate.on_external_condition_changed();
		options.set_scoped("rust", "workspace_symbols", i % 2 == 0);
		gate.inner.evaluate();
	}
	sleep(WINDOW * 4).await;

	assert_eq!(fired.load(Ordering::SeqCst), 1);
	assert_eq!(options.listener_count(), 0);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn register_scope_is_idempotent() {
	let options = Arc::new(OptionContext::new());
	let fired = Arc::new(AtomicUsize::new(0));
	let gate = gate(&options, &fired);

	gate.register_scope("rust");
	gate.register_scope("rust");
	gate.register_scope(String::from("rust"));
	assert_eq!(gate.scopes(), vec!["rust"]);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn shutdown_prevents_activation() {
	let options = Arc::new(OptionContext::new());
	let fired = Arc::new(AtomicUsize::new(0));
	let gate = gate(&options, &fired);

	options.set_global("symbol_search", true);
	options.set_scoped("rust", "suggest_imports", true);
	gate.register_scope("rust");
	gate.shutdown();

	assert!(timeout(WINDOW * 4, gate.activated()).await.is_err());
	assert_eq!(fired.load(Ordering::SeqCst), 0);
	assert_eq!(options.listener_count(), 0);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn shutdown_cancels_running_action() {
	let options = Arc::new(OptionContext::new());
	let finished = Arc::new(AtomicUsize::new(0));
	let done = Arc::clone(&finished);
	let spec = GateSpec::new("slow", "on", ["on"]).window(Duration::from_millis(10));
	let gate = DelayGate::new(spec, Arc::clone(&options), move |_cancel| async move {
		sleep(Duration::from_secs(60)).await;
		done.fetch_add(1, Ordering::SeqCst);
	});

	options.set_global("on", true);
	options.set_scoped("a", "on", true);
	gate.register_scope("a");
	gate.activated().await;

	gate.shutdown();
	sleep(Duration::from_secs(120)).await;
	assert_eq!(finished.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn window_override_keeps_fixed_policy() {
	let options = Arc::new(OptionContext::new());
	let fired = Arc::new(AtomicUsize::new(0));
	let settings = QueueSettings {
		debounce_ms: 500,
		policy: DebouncePolicy::Fixed,
	};
	let spec = GateSpec::new("fixed", "on", ["on"])
		.queue_settings(&settings)
		.window(Duration::from_millis(100));
	let counter = Arc::clone(&fired);
	let gate = DelayGate::new(spec, Arc::clone(&options), move |_cancel| async move {
		counter.fetch_add(1, Ordering::SeqCst);
	});

	options.set_global("on", true);
	options.set_scoped("a", "on", true);
	gate.register_scope("a");
	// Under a restart policy these would keep pushing activation out.
	for _ in 0..5 {
		sleep(Duration::from_millis(40)).await;
		gate.on_external_condition_changed();
	}

	assert!(gate.is_activated());
	sleep(Duration::from_millis(1)).await;
	assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn dropping_gate_unsubscribes() {
	let options = Arc::new(OptionContext::new());
	let fired = Arc::new(AtomicUsize::new(0));
	let gate = gate(&options, &fired);
	assert_eq!(options.listener_count(), 1);
	drop(gate);
	assert_eq!(options.listener_count(), 0);
}
