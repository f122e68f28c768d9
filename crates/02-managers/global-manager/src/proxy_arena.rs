//! 代理组件/接口的引用计数
//!
//! 组件代理的计数是它承载的接口代理数量，接口代理的计数是使用它的连接数量。
//! 这里的函数是计数的唯一修改入口。

use manager_common::{InterfaceLocation, ManagerError, ManagerResult};
use std::collections::BTreeMap;

use crate::registry::InterfaceRole;

/// 组件代理键：(所在进程, 代理组件名)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentProxyKey {
    /// 代理所在进程
    pub process: String,
    /// 代理组件名
    pub component: String,
}

/// 接口代理键：(所在进程, 代理组件名, 接口名, 角色)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InterfaceProxyKey {
    /// 接口代理位置
    pub location: InterfaceLocation,
    /// 接口角色
    pub role: InterfaceRole,
}

impl InterfaceProxyKey {
    /// 创建接口代理键
    pub fn new(location: InterfaceLocation, role: InterfaceRole) -> Self {
        Self { location, role }
    }

    /// 所属组件代理的键
    pub fn component_key(&self) -> ComponentProxyKey {
        ComponentProxyKey {
            process: self.location.process.clone(),
            component: self.location.component.clone(),
        }
    }
}

/// 释放接口代理的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyRelease {
    /// 接口代理剩余的连接数
    pub interface_remaining: usize,
    /// 接口代理已被移除时，组件代理剩余的接口代理数
    pub component_remaining: Option<usize>,
}

impl ProxyRelease {
    /// 接口代理是否应被销毁
    pub fn interface_removed(&self) -> bool {
        self.interface_remaining == 0
    }

    /// 组件代理是否应被销毁
    pub fn component_removed(&self) -> bool {
        self.component_remaining == Some(0)
    }
}

/// 代理引用计数表
#[derive(Debug, Default)]
pub struct ProxyArena {
    components: BTreeMap<ComponentProxyKey, usize>,
    interfaces: BTreeMap<InterfaceProxyKey, usize>,
}

impl ProxyArena {
    /// 创建空的代理表
    pub fn new() -> Self {
        Self::default()
    }

    /// 组件代理是否存在
    pub fn has_component(&self, key: &ComponentProxyKey) -> bool {
        self.components.contains_key(key)
    }

    /// 接口代理是否存在
    pub fn has_interface(&self, key: &InterfaceProxyKey) -> bool {
        self.interfaces.contains_key(key)
    }

    /// 组件代理的接口代理数量
    #[cfg(test)]
    pub fn component_count(&self, key: &ComponentProxyKey) -> Option<usize> {
        self.components.get(key).copied()
    }

    /// 登记新建的组件代理
    pub fn insert_component(&mut self, key: ComponentProxyKey) -> ManagerResult<()> {
        if self.components.contains_key(&key) {
            return Err(ManagerError::already_exists(format!(
                "组件代理已存在: {}:{}",
                key.process, key.component
            )));
        }
        self.components.insert(key, 0);
        Ok(())
    }

    /// 登记新建的接口代理并计入第一个连接
    pub fn insert_interface(&mut self, key: InterfaceProxyKey) -> ManagerResult<()> {
        if self.interfaces.contains_key(&key) {
            return Err(ManagerError::already_exists(format!(
                "接口代理已存在: {}",
                key.location
            )));
        }
        let component_key = key.component_key();
        let component = self.components.get_mut(&component_key).ok_or_else(|| {
            ManagerError::internal(format!(
                "接口代理所属的组件代理不存在: {}:{}",
                component_key.process, component_key.component
            ))
        })?;
        *component += 1;
        self.interfaces.insert(key, 1);
        Ok(())
    }

    /// 已有接口代理再多一个连接
    pub fn acquire_interface(&mut self, key: &InterfaceProxyKey) -> ManagerResult<usize> {
        let count = self
            .interfaces
            .get_mut(key)
            .ok_or_else(|| ManagerError::not_found(format!("接口代理不存在: {}", key.location)))?;
        *count += 1;
        Ok(*count)
    }

    /// 释放接口代理的一个连接
    ///
    /// 计数归零时移除接口代理；组件代理的最后一个接口代理被移除时一并移除组件代理。
    pub fn release_interface(&mut self, key: &InterfaceProxyKey) -> Option<ProxyRelease> {
        let count = self.interfaces.get_mut(key)?;
        *count = count.saturating_sub(1);
        let interface_remaining = *count;
        if interface_remaining > 0 {
            return Some(ProxyRelease {
                interface_remaining,
                component_remaining: None,
            });
        }

        self.interfaces.remove(key);
        let component_key = key.component_key();
        let component_remaining = self.components.get_mut(&component_key).map(|count| {
            *count = count.saturating_sub(1);
            *count
        });
        if component_remaining == Some(0) {
            self.components.remove(&component_key);
        }
        Some(ProxyRelease {
            interface_remaining,
            component_remaining,
        })
    }

    /// 丢弃某个进程中的全部代理（进程已移除）
    pub fn purge_process(&mut self, process: &str) -> usize {
        let before = self.components.len() + self.interfaces.len();
        self.components.retain(|key, _| key.process != process);
        self.interfaces
            .retain(|key, _| key.location.process != process);
        before - self.components.len() - self.interfaces.len()
    }

    /// 丢弃某个组件代理及其接口代理（组件已移除）
    pub fn purge_component(&mut self, process: &str, component: &str) -> usize {
        let before = self.components.len() + self.interfaces.len();
        self.components
            .retain(|key, _| !(key.process == process && key.component == component));
        self.interfaces.retain(|key, _| {
            !(key.location.process == process && key.location.component == component)
        });
        before - self.components.len() - self.interfaces.len()
    }

    /// 代理总数（组件代理 + 接口代理）
    pub fn len(&self) -> usize {
        self.components.len() + self.interfaces.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.components.is_empty() && self.interfaces.is_empty()
    }
}
