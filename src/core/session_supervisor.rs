//! 会话监管：每次执行的取消令牌与释放状态
//!
//! 每次 execute 通过 `begin_run` 拿到新的 token，cancel 只作用于当前执行，不会残留到下一次；
//! dispose 之后 `begin_run` 返回 None。

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct RunState {
    current: Option<CancellationToken>,
    disposed: bool,
}

#[derive(Debug, Default)]
pub struct SessionSupervisor {
    state: Mutex<RunState>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开始新的一次执行；已释放时返回 None
    pub fn begin_run(&self) -> Option<CancellationToken> {
        let mut state = self.state.lock();
        if state.disposed {
            return None;
        }
        let token = CancellationToken::new();
        state.current = Some(token.clone());
        Some(token)
    }

    /// 执行结束，丢弃当前 token
    pub fn end_run(&self) {
        self.state.lock().current = None;
    }

    /// 取消当前执行；空闲时为 no-op
    pub fn cancel(&self) {
        if let Some(token) = self.state.lock().current.as_ref() {
            tracing::info!("Cancelling current run");
            token.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().current.is_some()
    }

    pub fn dispose(&self) {
        let mut state = self.state.lock();
        state.disposed = true;
        if let Some(token) = state.current.take() {
            token.cancel();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_not_sticky() {
        let sup = SessionSupervisor::new();
        let first = sup.begin_run().unwrap();
        sup.cancel();
        assert!(first.is_cancelled());
        sup.end_run();

        let second = sup.begin_run().unwrap();
        assert!(!second.is_cancelled());
    }

    #[test]
    fn test_cancel_when_idle_is_noop() {
        let sup = SessionSupervisor::new();
        sup.cancel();
        assert!(!sup.is_running());
        assert!(!sup.begin_run().unwrap().is_cancelled());
    }

    #[test]
    fn test_dispose_cancels_and_blocks_new_runs() {
        let sup = SessionSupervisor::new();
        let token = sup.begin_run().unwrap();
        sup.dispose();
        assert!(token.is_cancelled());
        assert!(sup.is_disposed());
        assert!(sup.begin_run().is_none());
    }
}
