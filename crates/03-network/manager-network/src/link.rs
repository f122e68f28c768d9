//! 双向请求/应答链路

use async_trait::async_trait;
use dashmap::DashMap;
use manager_common::{ManagerConfig, ManagerError, ManagerResult, WireError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::codec::{read_frame, write_frame};
use crate::protocol::{Frame, Reply, Request};

/// 出站帧队列长度
const OUTBOUND_CAPACITY: usize = 256;

type PendingReplies = DashMap<u64, oneshot::Sender<Result<Reply, WireError>>>;

/// 处理对端发来的请求
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// 处理一个请求；每个请求在独立任务中执行
    async fn handle(&self, link: &Arc<Link>, request: Request) -> ManagerResult<Reply>;

    /// 链路关闭后调用
    async fn closed(&self, _link: &Arc<Link>) {}
}

/// 一条链路
///
/// 读任务把应答分发给等待者，把请求交给 [`RequestHandler`]；写任务串行写出帧。
pub struct Link {
    peer: String,
    outbound: mpsc::Sender<Frame>,
    pending: PendingReplies,
    next_id: AtomicU64,
    request_timeout: Duration,
    closed: CancellationToken,
}

impl Link {
    /// 在流上启动链路，返回链路与读任务句柄
    pub fn spawn<S>(
        stream: S,
        peer: impl Into<String>,
        config: &ManagerConfig,
        handler: Arc<dyn RequestHandler>,
    ) -> (Arc<Self>, JoinHandle<()>)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let link = Arc::new(Self {
            peer: peer.into(),
            outbound,
            pending: DashMap::new(),
            next_id: AtomicU64::new(1),
            request_timeout: config.request_timeout(),
            closed: CancellationToken::new(),
        });

        let (reader, writer) = tokio::io::split(stream);
        tokio::spawn(Self::write_loop(
            Arc::clone(&link),
            writer,
            outbound_rx,
            config.max_message_size,
        ));
        let task = tokio::spawn(Self::read_loop(
            Arc::clone(&link),
            reader,
            handler,
            config.max_message_size,
        ));
        (link, task)
    }

    /// 对端地址
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// 链路是否已关闭
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// 关闭链路
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// 等待链路关闭
    pub async fn wait_closed(&self) {
        self.closed.cancelled().await;
    }

    /// 发送请求并等待应答
    pub async fn call(&self, request: Request) -> ManagerResult<Reply> {
        if self.is_closed() {
            return Err(ManagerError::network(format!("与 {} 的链路已关闭", self.peer)));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        if self.outbound.send(Frame::Request { id, request }).await.is_err() {
            self.pending.remove(&id);
            return Err(ManagerError::network(format!("与 {} 的链路已关闭", self.peer)));
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result.map_err(ManagerError::from),
            Ok(Err(_)) => Err(ManagerError::network(format!(
                "等待应答时与 {} 的链路断开",
                self.peer
            ))),
            Err(_) => {
                self.pending.remove(&id);
                Err(ManagerError::timeout(format!(
                    "请求 {id} 在 {:?} 内没有得到 {} 的应答",
                    self.request_timeout, self.peer
                )))
            }
        }
    }

    async fn write_loop<W>(
        link: Arc<Self>,
        mut writer: W,
        mut outbound_rx: mpsc::Receiver<Frame>,
        max_message_size: usize,
    ) where
        W: AsyncWrite + Unpin,
    {
        loop {
            tokio::select! {
                () = link.closed.cancelled() => break,
                frame = outbound_rx.recv() => {
                    let Some(frame) = frame else { break };
                    if let Err(e) = write_frame(&mut writer, &frame, max_message_size).await {
                        warn!("向 {} 写出帧失败: {}", link.peer, e);
                        link.close();
                        break;
                    }
                }
            }
        }
        debug!("到 {} 的写任务结束", link.peer);
    }

    async fn read_loop<R>(
        link: Arc<Self>,
        mut reader: R,
        handler: Arc<dyn RequestHandler>,
        max_message_size: usize,
    ) where
        R: AsyncRead + Unpin,
    {
        let mut buffer = Vec::with_capacity(4096);
        loop {
            let frame = tokio::select! {
                () = link.closed.cancelled() => break,
                frame = read_frame(&mut reader, max_message_size, &mut buffer) => frame,
            };
            match frame {
                Ok(Some(Frame::Request { id, request })) => {
                    let link = Arc::clone(&link);
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        let result = handler
                            .handle(&link, request)
                            .await
                            .map_err(|e| WireError::from(&e));
                        if link.outbound.send(Frame::Response { id, result }).await.is_err() {
                            debug!("链路已关闭，丢弃请求 {} 的应答", id);
                        }
                    });
                }
                Ok(Some(Frame::Response { id, result })) => match link.pending.remove(&id) {
                    Some((_, waiter)) => {
                        let _ = waiter.send(result);
                    }
                    None => debug!("收到未知请求 {} 的应答（可能已超时）", id),
                },
                Ok(None) => {
                    debug!("{} 关闭了链路", link.peer);
                    break;
                }
                Err(e) => {
                    warn!("从 {} 读取帧失败: {}", link.peer, e);
                    break;
                }
            }
        }

        link.close();
        link.pending.clear();
        handler.closed(&link).await;
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("peer", &self.peer)
            .field("pending", &self.pending.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::GlobalCall;

    struct Echo;

    #[async_trait]
    impl RequestHandler for Echo {
        async fn handle(&self, _link: &Arc<Link>, request: Request) -> ManagerResult<Reply> {
            match request {
                Request::Global(GlobalCall::FindProcess { process }) => {
                    Ok(Reply::Flag(process == "P1"))
                }
                other => Err(ManagerError::invalid_state(format!("不支持: {other:?}"))),
            }
        }
    }

    fn pair(config: &ManagerConfig) -> (Arc<Link>, Arc<Link>) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let (left, _) = Link::spawn(a, "left", config, Arc::new(Echo));
        let (right, _) = Link::spawn(b, "right", config, Arc::new(Echo));
        (left, right)
    }

    #[tokio::test]
    async fn test_call_both_directions() {
        let (left, right) = pair(&ManagerConfig::default());
        let found = left
            .call(Request::Global(GlobalCall::FindProcess { process: "P1".into() }))
            .await
            .unwrap();
        assert_eq!(found, Reply::Flag(true));

        let error = right
            .call(Request::Global(GlobalCall::GetNamesOfProcesses))
            .await
            .unwrap_err();
        assert!(matches!(error, ManagerError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_call_after_close_fails() {
        let (left, right) = pair(&ManagerConfig::default());
        left.close();
        tokio::time::timeout(Duration::from_secs(2), right.wait_closed())
            .await
            .unwrap();
        assert!(matches!(
            right
                .call(Request::Global(GlobalCall::GetNamesOfProcesses))
                .await,
            Err(ManagerError::NetworkFailure { .. })
        ));
    }
}
