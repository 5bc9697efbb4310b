use super::*;
use peft_core::Notification;

fn notification(title: &str) -> Notification {
    Notification::builder().title(title).body("body").build()
}

#[tokio::test]
async fn fake_adapter_records_calls() {
    let adapter = FakeNotifyAdapter::new();
    adapter.notify(&notification("50% complete")).await.unwrap();
    adapter.notify(&notification("75% complete")).await.unwrap();

    let calls = adapter.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].title, "50% complete");
}

#[tokio::test]
async fn fake_dnd_defaults_to_not_active() {
    let adapter = FakeNotifyAdapter::new();
    assert!(!adapter.is_dnd_active().await);
}

#[tokio::test]
async fn fake_dnd_reflects_set_state() {
    let adapter = FakeNotifyAdapter::new();
    adapter.set_dnd(true);
    assert!(adapter.is_dnd_active().await);
}
