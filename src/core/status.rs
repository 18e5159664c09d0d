//! 状态广播
//!
//! 回调订阅者按订阅顺序同步收到每个快照；发布时先复制订阅者列表再逐个调用，
//! 因此回调内部取消订阅（包括取消自己）不会影响本轮投递。异步观察者可使用 `watch()`。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::core::Status;

type Callback = Arc<dyn Fn(&Status) + Send + Sync>;

struct Inner {
    subscribers: Mutex<Vec<(u64, Callback)>>,
    next_id: AtomicU64,
    disposed: AtomicBool,
    current: watch::Sender<Status>,
}

/// 状态广播器；克隆共享同一订阅者列表
#[derive(Clone)]
pub struct StatusBroadcaster {
    inner: Arc<Inner>,
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBroadcaster {
    pub fn new() -> Self {
        let (current, _) = watch::channel(Status::default());
        Self {
            inner: Arc::new(Inner {
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                disposed: AtomicBool::new(false),
                current,
            }),
        }
    }

    /// 注册回调；返回的 Subscription 用于取消
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Status) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        if !self.inner.disposed.load(Ordering::Acquire) {
            self.inner.subscribers.lock().push((id, Arc::new(callback)));
        }
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// 发布新快照；dispose 之后为 no-op
    pub fn publish(&self, status: Status) {
        if self.inner.disposed.load(Ordering::Acquire) {
            return;
        }
        tracing::debug!(stage = ?status.stage, "Status changed");
        self.inner.current.send_replace(status.clone());

        let snapshot: Vec<Callback> = self
            .inner
            .subscribers
            .lock()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for cb in snapshot {
            cb(&status);
        }
    }

    pub fn current(&self) -> Status {
        self.inner.current.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Status> {
        self.inner.current.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// 移除全部订阅者，之后的 publish / subscribe 不再生效
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::Release);
        self.inner.subscribers.lock().clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }
}

/// 订阅句柄；unsubscribe 幂等。drop 句柄不会取消订阅
#[derive(Clone, Debug)]
pub struct Subscription {
    id: u64,
    inner: Weak<Inner>,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.subscribers.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StatusStage;

    fn recorder(b: &StatusBroadcaster) -> (Arc<Mutex<Vec<StatusStage>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = b.subscribe(move |s: &Status| sink.lock().push(s.stage));
        (seen, sub)
    }

    #[test]
    fn test_delivery_in_subscription_order() {
        let b = StatusBroadcaster::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["a", "b", "c"] {
            let order = order.clone();
            b.subscribe(move |_s: &Status| order.lock().push(tag));
        }
        b.publish(Status::new(StatusStage::Submitted));
        assert_eq!(*order.lock(), vec!["a", "b", "c"]);
        assert_eq!(b.current().stage, StatusStage::Submitted);
    }

    #[test]
    fn test_unsubscribe_only_removes_that_callback() {
        let b = StatusBroadcaster::new();
        let (first, sub1) = recorder(&b);
        let (second, _sub2) = recorder(&b);

        b.publish(Status::new(StatusStage::Submitted));
        sub1.unsubscribe();
        sub1.unsubscribe();
        b.publish(Status::new(StatusStage::Ready));

        assert_eq!(*first.lock(), vec![StatusStage::Submitted]);
        assert_eq!(*second.lock(), vec![StatusStage::Submitted, StatusStage::Ready]);
    }

    #[test]
    fn test_self_unsubscribe_during_delivery() {
        let b = StatusBroadcaster::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let hits = Arc::new(AtomicU64::new(0));

        let (slot_cb, hits_cb) = (slot.clone(), hits.clone());
        let sub = b.subscribe(move |_s: &Status| {
            hits_cb.fetch_add(1, Ordering::SeqCst);
            if let Some(me) = slot_cb.lock().take() {
                me.unsubscribe();
            }
        });
        *slot.lock() = Some(sub);
        let (later, _sub) = recorder(&b);

        b.publish(Status::new(StatusStage::Submitted));
        b.publish(Status::new(StatusStage::Ready));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(later.lock().len(), 2);
    }

    #[test]
    fn test_dispose_stops_publishing() {
        let b = StatusBroadcaster::new();
        let (seen, _sub) = recorder(&b);
        b.dispose();
        b.publish(Status::new(StatusStage::Error));
        assert!(seen.lock().is_empty());
        assert_eq!(b.subscriber_count(), 0);
        assert_eq!(b.current().stage, StatusStage::Ready);
    }

    #[tokio::test]
    async fn test_watch_sees_latest_snapshot() {
        let b = StatusBroadcaster::new();
        let mut rx = b.watch();
        b.publish(Status::new(StatusStage::Executing).with_message("Running add_node"));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().stage, StatusStage::Executing);
    }
}
