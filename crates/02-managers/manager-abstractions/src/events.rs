//! 管理器事件

use manager_common::{ComponentKind, ConnectionDescription, ConnectionId};
use serde::{Deserialize, Serialize};

/// GCM 发布的事件
///
/// 由管理器组件服务端等观察者订阅。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManagerEvent {
    /// 进程已注册
    ProcessAdded {
        /// 进程名
        process: String,
    },
    /// 进程已移除
    ProcessRemoved {
        /// 进程名
        process: String,
    },
    /// 组件注册完成（接口已全部登记）
    ComponentAdded {
        /// 进程名
        process: String,
        /// 组件名
        component: String,
        /// 组件类别
        kind: ComponentKind,
    },
    /// 组件已移除
    ComponentRemoved {
        /// 进程名
        process: String,
        /// 组件名
        component: String,
    },
    /// 连接已登记（等待确认）
    ConnectionAdded {
        /// 连接标识
        id: ConnectionId,
        /// 六元组身份
        description: ConnectionDescription,
    },
    /// 连接已确认
    ConnectionConfirmed {
        /// 连接标识
        id: ConnectionId,
    },
    /// 连接已拆除
    ConnectionRemoved {
        /// 连接标识
        id: ConnectionId,
        /// 六元组身份
        description: ConnectionDescription,
    },
}
