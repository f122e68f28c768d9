//! 断开请求队列与后台协调任务
//!
//! `Disconnect(id)` 只在本队列的锁内检查并入队，真正的拆除由协调任务完成。
//! 一个标识在任一时刻只会处于等待、处理中、已处理三者之一。

use manager_common::ConnectionId;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::manager::GlobalManager;

/// 断开请求在队列中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectStatus {
    /// 等待处理
    Waiting,
    /// 正在拆除
    InProgress,
    /// 已拆除
    Processed,
}

/// 一次断开请求的受理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectRequest {
    /// 新加入等待队列
    Queued,
    /// 已在等待、处理中或已处理
    AlreadyQueued,
    /// 标识分配过，但连接已不存在
    AlreadyGone,
    /// 标识从未分配
    Unknown,
}

/// 断开请求队列
#[derive(Debug)]
pub struct DisconnectQueues {
    waiting: VecDeque<ConnectionId>,
    waiting_set: BTreeSet<ConnectionId>,
    in_progress: BTreeSet<ConnectionId>,
    processed: VecDeque<ConnectionId>,
    processed_set: BTreeSet<ConnectionId>,
    retention: usize,
    /// 已登记且尚未拆除的连接
    live: BTreeSet<ConnectionId>,
    /// 已分配过的最大标识
    highest_allocated: Option<ConnectionId>,
}

impl DisconnectQueues {
    /// 创建队列，`retention` 为已处理标识的保留数量
    pub fn new(retention: usize) -> Self {
        Self {
            waiting: VecDeque::new(),
            waiting_set: BTreeSet::new(),
            in_progress: BTreeSet::new(),
            processed: VecDeque::new(),
            processed_set: BTreeSet::new(),
            retention: retention.max(1),
            live: BTreeSet::new(),
            highest_allocated: None,
        }
    }

    /// 记录一个已分配的标识
    pub fn note_allocated(&mut self, id: ConnectionId) {
        if self.highest_allocated.map_or(true, |highest| id > highest) {
            self.highest_allocated = Some(id);
        }
    }

    /// 记录一个已进入连接表的连接
    pub fn note_live(&mut self, id: ConnectionId) {
        self.note_allocated(id);
        self.live.insert(id);
    }

    /// 受理断开请求，只操作本队列
    pub fn request(&mut self, id: ConnectionId) -> DisconnectRequest {
        if self.status(id).is_some() {
            return DisconnectRequest::AlreadyQueued;
        }
        if self.live.contains(&id) {
            self.enqueue(id);
            return DisconnectRequest::Queued;
        }
        match self.highest_allocated {
            Some(highest) if id >= ConnectionId::FIRST && id <= highest => {
                DisconnectRequest::AlreadyGone
            }
            _ => DisconnectRequest::Unknown,
        }
    }

    /// 等待中或正在拆除
    pub fn is_outstanding(&self, id: ConnectionId) -> bool {
        matches!(
            self.status(id),
            Some(DisconnectStatus::Waiting | DisconnectStatus::InProgress)
        )
    }

    /// 标识当前所处的位置
    pub fn status(&self, id: ConnectionId) -> Option<DisconnectStatus> {
        if self.waiting_set.contains(&id) {
            Some(DisconnectStatus::Waiting)
        } else if self.in_progress.contains(&id) {
            Some(DisconnectStatus::InProgress)
        } else if self.processed_set.contains(&id) {
            Some(DisconnectStatus::Processed)
        } else {
            None
        }
    }

    /// 加入等待队列，已在任一队列中时返回 false
    pub fn enqueue(&mut self, id: ConnectionId) -> bool {
        if self.status(id).is_some() {
            return false;
        }
        self.waiting_set.insert(id);
        self.waiting.push_back(id);
        true
    }

    /// 按 FIFO 顺序取出全部等待中的标识并标记为处理中
    pub fn take_waiting(&mut self) -> Vec<ConnectionId> {
        let batch: Vec<ConnectionId> = self.waiting.drain(..).collect();
        for id in &batch {
            self.waiting_set.remove(id);
            self.in_progress.insert(*id);
        }
        batch
    }

    /// 标记为已处理，超过保留数量时丢弃最早的记录
    pub fn finish(&mut self, id: ConnectionId) {
        self.in_progress.remove(&id);
        self.live.remove(&id);
        if self.processed_set.insert(id) {
            self.processed.push_back(id);
        }
        while self.processed.len() > self.retention {
            if let Some(oldest) = self.processed.pop_front() {
                self.processed_set.remove(&oldest);
            }
        }
    }

    /// 等待中与处理中的数量
    pub fn outstanding(&self) -> usize {
        self.waiting.len() + self.in_progress.len()
    }

    /// 保留的已处理数量
    pub fn processed_len(&self) -> usize {
        self.processed.len()
    }
}

/// 启动后台协调任务
///
/// 任务只持有管理器的弱引用，管理器被释放后自动退出。
pub(crate) fn spawn_reconciler(
    manager: Weak<GlobalManager>,
    wake: std::sync::Arc<Notify>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("断开协调任务已启动，周期: {:?}", interval);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = wake.notified() => debug!("断开协调任务被唤醒"),
                () = tokio::time::sleep(interval) => {}
            }

            let Some(manager) = manager.upgrade() else {
                break;
            };
            manager.reconcile().await;
        }
        info!("断开协调任务已停止");
    })
}
