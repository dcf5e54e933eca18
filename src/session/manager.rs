//! 会话管理：把一连串模型变更合并为一次延迟写出
//!
//! 待写槽是容量为 1 的同步通道，变更通知用非阻塞 `try_send` 投递；槽已被占用时
//! 直接丢弃。后台唯一的写线程取出令牌后调用编组器重新推导整份文档，所以被丢弃
//! 的通知不会丢失信息。

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::config::WRITER_THREAD_NAME;
use crate::model::error::MarshalError;
use crate::model::marshaller::Persist;
use crate::session::observable::{Observable, SubscriptionId};

pub struct SessionManager {
    slot: SyncSender<()>,
    running: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
    /// 持有强引用，保证按地址判重时地址不会被复用；停止时逐个退订
    observed: Mutex<Vec<(Arc<dyn Observable>, SubscriptionId)>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("running", &self.is_running())
            .field("writes", &self.write_count())
            .field("observed", &self.observed.lock().len())
            .finish()
    }
}

/// 非阻塞地占用待写槽
fn offer(slot: &SyncSender<()>) {
    match slot.try_send(()) {
        Ok(()) => tracing::debug!("已登记一次待写"),
        Err(TrySendError::Full(())) => tracing::debug!("已有待写，本次通知合并"),
        Err(TrySendError::Disconnected(())) => tracing::debug!("写线程已退出，忽略通知"),
    }
}

fn run_writer<M: Persist>(
    marshaller: Arc<Mutex<M>>,
    pending: Receiver<()>,
    running: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
) {
    while running.load(Ordering::Acquire) {
        if pending.recv().is_err() {
            break;
        }
        if !running.load(Ordering::Acquire) {
            break;
        }
        let ok = marshaller.lock().persist();
        writes.fetch_add(1, Ordering::AcqRel);
        if !ok {
            tracing::warn!("后台写出失败，等待下一次变更");
        }
    }
    tracing::debug!("后台写线程退出");
}

impl SessionManager {
    /// 启动后台写线程。编组器放在互斥锁后面：写线程与调用方的读取互斥
    pub fn start<M: Persist + 'static>(marshaller: Arc<Mutex<M>>) -> Result<Self, MarshalError> {
        let (slot, pending) = mpsc::sync_channel::<()>(1);
        let running = Arc::new(AtomicBool::new(true));
        let writes = Arc::new(AtomicUsize::new(0));

        let worker = {
            let running = running.clone();
            let writes = writes.clone();
            thread::Builder::new()
                .name(WRITER_THREAD_NAME.to_string())
                .spawn(move || run_writer(marshaller, pending, running, writes))?
        };
        tracing::info!("会话已启动");

        Ok(Self {
            slot,
            running,
            writes,
            observed: Mutex::new(Vec::new()),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// 订阅一个可观察元素；同一实例重复登记或会话已停止时返回 `false`
    pub fn observe<O: Observable + 'static>(&self, observable: &Arc<O>) -> bool {
        let target = Arc::as_ptr(observable) as *const ();
        let mut observed = self.observed.lock();
        if !self.is_running()
            || observed
                .iter()
                .any(|(o, _)| Arc::as_ptr(o) as *const () == target)
        {
            return false;
        }

        let slot = self.slot.clone();
        let running = self.running.clone();
        let id = observable.subscribe(Arc::new(move || {
            if running.load(Ordering::Acquire) {
                offer(&slot);
            }
        }));
        let entry: Arc<dyn Observable> = observable.clone();
        observed.push((entry, id));
        true
    }

    /// 不经过可观察元素，直接请求一次写出（同样合并）
    pub fn request_write(&self) {
        if self.is_running() {
            offer(&self.slot);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// 后台线程已执行的写出次数
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Acquire)
    }

    /// 停止会话：清除运行标志、唤醒写线程并等待其退出。
    /// 返回之后不会再发生任何写出；正在进行的那次写出会先完成。
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        let observed = std::mem::take(&mut *self.observed.lock());
        for (observable, id) in observed {
            observable.unsubscribe(id);
        }
        // 槽已满时写线程同样会醒来看到标志
        let _ = self.slot.try_send(());
        let Some(handle) = self.worker.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            tracing::error!("后台写线程异常退出");
        }
        tracing::info!("会话已停止，共写出 {} 次", self.write_count());
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::observable::{ObservableCell, ObservableList, ObservableMap};
    use std::sync::mpsc::RecvTimeoutError;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);
    const QUIET: Duration = Duration::from_millis(300);

    struct Gated<P, T> {
        persist: Arc<Mutex<P>>,
        /// 第一次写出已开始并停在闸门前
        entered: Receiver<()>,
        written: Receiver<T>,
        gate: SyncSender<()>,
    }

    /// 第一次写出会卡在闸门上，直到测试放行
    fn gated_writer<T: Send + 'static>(
        mut snapshot: impl FnMut() -> T + Send + 'static,
    ) -> Gated<impl Persist, T> {
        let (entered_tx, entered) = mpsc::channel();
        let (written_tx, written) = mpsc::channel();
        let (gate, gate_rx) = mpsc::sync_channel::<()>(0);
        let mut first = true;
        let persist = move || {
            if first {
                first = false;
                let _ = entered_tx.send(());
                let _ = gate_rx.recv();
            }
            let _ = written_tx.send(snapshot());
            true
        };
        Gated {
            persist: Arc::new(Mutex::new(persist)),
            entered,
            written,
            gate,
        }
    }

    #[test]
    fn test_burst_collapses_to_one_write() {
        let g = gated_writer(|| ());
        let session = SessionManager::start(g.persist).unwrap();

        let cell = Arc::new(ObservableCell::new(0));
        let list: Arc<ObservableList<String>> = Arc::new(ObservableList::default());
        let map: Arc<ObservableMap<String, i32>> = Arc::new(ObservableMap::new());
        assert!(session.observe(&cell));
        assert!(session.observe(&list));
        assert!(session.observe(&map));

        cell.set(1);
        g.entered.recv_timeout(WAIT).unwrap();

        // 写线程忙时来的一串通知只占一个槽
        cell.set(2);
        list.push("a".into());
        map.insert("k".into(), 1);
        cell.set(3);
        list.push("b".into());

        g.gate.send(()).unwrap();
        g.written.recv_timeout(WAIT).unwrap();
        g.written.recv_timeout(WAIT).unwrap();
        assert_eq!(g.written.recv_timeout(QUIET), Err(RecvTimeoutError::Timeout));

        session.stop();
        assert_eq!(session.write_count(), 2, "首次写出 + 合并后的一次");
    }

    #[test]
    fn test_observe_is_idempotent() {
        let session = SessionManager::start(Arc::new(Mutex::new(|| true))).unwrap();
        let cell = Arc::new(ObservableCell::new("x".to_string()));
        assert!(session.observe(&cell));
        assert!(!session.observe(&cell));
        assert!(!session.observe(&cell.clone()));
        assert_eq!(cell.listener_count(), 1);

        let other = Arc::new(ObservableCell::new("x".to_string()));
        assert!(session.observe(&other), "不同实例各自登记");
    }

    #[test]
    fn test_write_reflects_latest_state() {
        let cell = Arc::new(ObservableCell::new(0));
        let source = cell.clone();
        let g = gated_writer(move || source.get());
        let session = SessionManager::start(g.persist).unwrap();
        session.observe(&cell);

        session.request_write();
        g.entered.recv_timeout(WAIT).unwrap();
        for v in 1..=3 {
            cell.set(v);
        }
        g.gate.send(()).unwrap();

        let mut last = g.written.recv_timeout(WAIT).unwrap();
        while let Ok(v) = g.written.recv_timeout(QUIET) {
            last = v;
        }
        assert_eq!(last, 3, "写出的是唤醒时的最新状态");
        session.stop();
        assert_eq!(session.write_count(), 2);
    }

    #[test]
    fn test_no_writes_after_stop() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let session = SessionManager::start(Arc::new(Mutex::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
            true
        })))
        .unwrap();
        let cell = Arc::new(ObservableCell::new(0));
        session.observe(&cell);

        session.stop();
        assert!(!session.is_running());
        cell.set(1);
        session.request_write();
        thread::sleep(QUIET);

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(session.write_count(), 0);
        // 重复停止是无操作
        session.stop();
    }

    #[test]
    fn test_stop_waits_for_in_flight_write() {
        let g = gated_writer(|| ());
        let session = Arc::new(SessionManager::start(g.persist).unwrap());
        session.request_write();
        g.entered.recv_timeout(WAIT).unwrap();

        let stopper = {
            let session = session.clone();
            thread::spawn(move || session.stop())
        };
        g.gate.send(()).unwrap();
        stopper.join().unwrap();

        assert_eq!(g.written.recv_timeout(WAIT), Ok(()));
        // 写线程退出后发送端随编组器一起被释放
        assert_eq!(g.written.recv_timeout(QUIET), Err(RecvTimeoutError::Disconnected));
        assert_eq!(session.write_count(), 1);
    }

    #[test]
    fn test_stop_unsubscribes_observed() {
        let cell = Arc::new(ObservableCell::new(0));
        let list: Arc<ObservableList<String>> = Arc::new(ObservableList::default());
        for _ in 0..3 {
            let session = SessionManager::start(Arc::new(Mutex::new(|| true))).unwrap();
            assert!(session.observe(&cell));
            assert!(session.observe(&list));
            assert_eq!(cell.listener_count(), 1);
            session.stop();
            assert_eq!(cell.listener_count(), 0);
            assert_eq!(list.listener_count(), 0);
            assert!(!session.observe(&cell), "停止后不再登记");
        }

        {
            let session = SessionManager::start(Arc::new(Mutex::new(|| true))).unwrap();
            assert!(session.observe(&cell));
        }
        assert_eq!(cell.listener_count(), 0, "析构同样退订");
    }
}
