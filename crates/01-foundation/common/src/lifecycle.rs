//! 组件类别与生命周期状态

use serde::{Deserialize, Serialize};
use std::fmt;

/// 组件类别
///
/// 在注册时确定一次，之后的遍历都直接读取该标签。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    /// 普通用户组件
    Generic,
    /// 管理器组件客户端（每个进程一个）
    ManagerClient,
    /// 管理器组件服务端（与 GCM 同进程）
    ManagerServer,
    /// 代表远端组件的代理
    Proxy,
}

impl ComponentKind {
    /// 是否为管理器组件
    pub fn is_manager(self) -> bool {
        matches!(self, Self::ManagerClient | Self::ManagerServer)
    }

    /// 是否为用户组件
    pub fn is_user(self) -> bool {
        matches!(self, Self::Generic)
    }
}

impl Default for ComponentKind {
    fn default() -> Self {
        Self::Generic
    }
}

/// 组件生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ComponentState {
    /// 已构造
    Constructed,
    /// 已创建，等待启动
    Ready,
    /// 运行中
    Active,
    /// 已结束
    Finished,
}

impl ComponentState {
    /// 是否可以创建
    pub fn can_create(self) -> bool {
        matches!(self, Self::Constructed)
    }

    /// 是否可以启动
    pub fn can_start(self) -> bool {
        matches!(self, Self::Ready)
    }

    /// 是否可以结束
    pub fn can_kill(self) -> bool {
        !matches!(self, Self::Finished)
    }
}

impl Default for ComponentState {
    fn default() -> Self {
        Self::Constructed
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Constructed => "constructed",
            Self::Ready => "ready",
            Self::Active => "active",
            Self::Finished => "finished",
        };
        f.write_str(text)
    }
}
