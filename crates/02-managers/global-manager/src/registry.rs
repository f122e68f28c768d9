//! 进程/组件/接口注册表
//!
//! 按名称分层存储：进程 → 组件 → {提供/输出接口, 所需/输入接口} → 连接标识列表。
//! 注册表本身不做 I/O，也不加锁，由 [`crate::GlobalManager`] 用单独的锁保护。

use manager_abstractions::LocalManagerInterface;
use manager_common::{
    describe_available, ComponentKind, ConnectionId, InterfaceLocation, ManagerError,
    ManagerResult,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// 接口角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InterfaceRole {
    /// 提供/输出接口，可以有任意多个连接
    Provided,
    /// 所需/输入接口，同一时刻最多一个连接
    Required,
}

impl fmt::Display for InterfaceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provided => f.write_str("提供/输出接口"),
            Self::Required => f.write_str("所需/输入接口"),
        }
    }
}

/// 接口条目
#[derive(Debug, Default, Clone)]
pub struct InterfaceEntry {
    connections: Vec<ConnectionId>,
}

impl InterfaceEntry {
    /// 引用该接口的连接
    pub fn connections(&self) -> &[ConnectionId] {
        &self.connections
    }
}

/// 组件条目
#[derive(Debug, Clone)]
pub struct ComponentEntry {
    kind: ComponentKind,
    committed: bool,
    provided: BTreeMap<String, InterfaceEntry>,
    required: BTreeMap<String, InterfaceEntry>,
}

impl ComponentEntry {
    fn new(kind: ComponentKind) -> Self {
        Self {
            kind,
            committed: false,
            provided: BTreeMap::new(),
            required: BTreeMap::new(),
        }
    }

    /// 组件类别
    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    /// 是否已提交注册
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    fn interfaces(&self, role: InterfaceRole) -> &BTreeMap<String, InterfaceEntry> {
        match role {
            InterfaceRole::Provided => &self.provided,
            InterfaceRole::Required => &self.required,
        }
    }

    fn interfaces_mut(&mut self, role: InterfaceRole) -> &mut BTreeMap<String, InterfaceEntry> {
        match role {
            InterfaceRole::Provided => &mut self.provided,
            InterfaceRole::Required => &mut self.required,
        }
    }

    fn has_interfaces(&self) -> bool {
        !self.provided.is_empty() || !self.required.is_empty()
    }

    /// 组件所有接口引用的连接
    pub fn connection_ids(&self) -> BTreeSet<ConnectionId> {
        self.provided
            .values()
            .chain(self.required.values())
            .flat_map(|entry| entry.connections.iter().copied())
            .collect()
    }
}

/// 进程条目
#[derive(Clone, Default)]
pub struct ProcessEntry {
    handle: Option<Arc<dyn LocalManagerInterface>>,
    components: BTreeMap<String, ComponentEntry>,
}

impl ProcessEntry {
    /// 进程所有组件引用的连接
    pub fn connection_ids(&self) -> BTreeSet<ConnectionId> {
        self.components
            .values()
            .flat_map(ComponentEntry::connection_ids)
            .collect()
    }

    /// 组件名列表
    pub fn component_names(&self) -> Vec<String> {
        self.components.keys().cloned().collect()
    }
}

impl fmt::Debug for ProcessEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessEntry")
            .field("has_handle", &self.handle.is_some())
            .field("components", &self.components)
            .finish()
    }
}

/// 进程/组件/接口注册表
#[derive(Debug, Default)]
pub struct Registry {
    processes: BTreeMap<String, ProcessEntry>,
}

impl Registry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    // ---- 进程 ----

    /// 注册进程
    pub fn add_process(
        &mut self,
        process: &str,
        handle: Option<Arc<dyn LocalManagerInterface>>,
    ) -> ManagerResult<()> {
        if let Some(entry) = self.processes.get_mut(process) {
            // 先以名称注册、后补句柄的情况
            if entry.handle.is_none() && handle.is_some() {
                entry.handle = handle;
                return Ok(());
            }
            return Err(ManagerError::already_exists(format!("进程已存在: {process}")));
        }
        self.processes.insert(
            process.to_string(),
            ProcessEntry {
                handle,
                components: BTreeMap::new(),
            },
        );
        Ok(())
    }

    /// 移除进程并返回其条目
    pub fn remove_process(&mut self, process: &str) -> ManagerResult<ProcessEntry> {
        self.processes
            .remove(process)
            .ok_or_else(|| self.missing_process(process))
    }

    /// 进程是否存在
    pub fn find_process(&self, process: &str) -> bool {
        self.processes.contains_key(process)
    }

    /// 进程的反向调用句柄
    pub fn process_handle(&self, process: &str) -> Option<Arc<dyn LocalManagerInterface>> {
        self.processes
            .get(process)
            .and_then(|entry| entry.handle.clone())
    }

    /// 所有进程名
    pub fn process_names(&self) -> Vec<String> {
        self.processes.keys().cloned().collect()
    }

    // ---- 组件 ----

    /// 注册组件
    pub fn add_component(
        &mut self,
        process: &str,
        component: &str,
        kind: ComponentKind,
    ) -> ManagerResult<()> {
        let entry = self.process_mut(process)?;
        if entry.components.contains_key(component) {
            return Err(ManagerError::already_exists(format!(
                "组件已存在: {process}:{component}"
            )));
        }
        entry
            .components
            .insert(component.to_string(), ComponentEntry::new(kind));
        Ok(())
    }

    /// 标记组件注册已提交，返回组件类别
    pub fn commit_component(
        &mut self,
        process: &str,
        component: &str,
    ) -> ManagerResult<ComponentKind> {
        let entry = self.component_mut(process, component)?;
        if entry.committed {
            return Err(ManagerError::invalid_state(format!(
                "组件注册已提交: {process}:{component}"
            )));
        }
        entry.committed = true;
        Ok(entry.kind)
    }

    /// 移除组件并返回其条目
    ///
    /// `cascade` 为 false 时组件仍有接口则失败。
    pub fn remove_component(
        &mut self,
        process: &str,
        component: &str,
        cascade: bool,
    ) -> ManagerResult<ComponentEntry> {
        let entry = self.component(process, component)?;
        if !cascade && entry.has_interfaces() {
            return Err(ManagerError::invalid_state(format!(
                "组件仍有接口，不能以非级联方式移除: {process}:{component}"
            )));
        }
        let process_entry = self.process_mut(process)?;
        process_entry
            .components
            .remove(component)
            .ok_or_else(|| ManagerError::internal(format!("组件条目消失: {process}:{component}")))
    }

    /// 组件是否存在
    pub fn find_component(&self, process: &str, component: &str) -> bool {
        self.processes
            .get(process)
            .is_some_and(|entry| entry.components.contains_key(component))
    }

    /// 组件条目
    pub fn component(&self, process: &str, component: &str) -> ManagerResult<&ComponentEntry> {
        let entry = self
            .processes
            .get(process)
            .ok_or_else(|| self.missing_process(process))?;
        entry
            .components
            .get(component)
            .ok_or_else(|| missing_component(process, component, entry))
    }

    /// 进程内所有组件名
    pub fn component_names(&self, process: &str) -> ManagerResult<Vec<String>> {
        self.processes
            .get(process)
            .map(ProcessEntry::component_names)
            .ok_or_else(|| self.missing_process(process))
    }

    // ---- 接口 ----

    /// 注册接口
    pub fn add_interface(
        &mut self,
        location: &InterfaceLocation,
        role: InterfaceRole,
    ) -> ManagerResult<()> {
        let entry = self.component_mut(&location.process, &location.component)?;
        let interfaces = entry.interfaces_mut(role);
        if interfaces.contains_key(&location.interface) {
            return Err(ManagerError::already_exists(format!("{role}已存在: {location}")));
        }
        interfaces.insert(location.interface.clone(), InterfaceEntry::default());
        Ok(())
    }

    /// 移除接口，返回仍引用它的连接
    pub fn remove_interface(
        &mut self,
        location: &InterfaceLocation,
        role: InterfaceRole,
    ) -> ManagerResult<Vec<ConnectionId>> {
        let entry = self.component_mut(&location.process, &location.component)?;
        entry
            .interfaces_mut(role)
            .remove(&location.interface)
            .map(|interface| interface.connections)
            .ok_or_else(|| ManagerError::not_found(format!("{role}不存在: {location}")))
    }

    /// 接口是否存在
    pub fn find_interface(&self, location: &InterfaceLocation, role: InterfaceRole) -> bool {
        self.interface(location, role).is_ok()
    }

    /// 接口条目
    pub fn interface(
        &self,
        location: &InterfaceLocation,
        role: InterfaceRole,
    ) -> ManagerResult<&InterfaceEntry> {
        let entry = self.component(&location.process, &location.component)?;
        let interfaces = entry.interfaces(role);
        interfaces.get(&location.interface).ok_or_else(|| {
            let names: Vec<String> = interfaces.keys().cloned().collect();
            ManagerError::not_found(format!(
                "{role}不存在: {location}；{}",
                describe_available(&names, "该组件没有可用的此类接口")
            ))
        })
    }

    /// 组件指定角色的接口名
    pub fn interface_names(
        &self,
        process: &str,
        component: &str,
        role: InterfaceRole,
    ) -> ManagerResult<Vec<String>> {
        Ok(self
            .component(process, component)?
            .interfaces(role)
            .keys()
            .cloned()
            .collect())
    }

    /// 接口引用的连接
    pub fn connections_of(
        &self,
        location: &InterfaceLocation,
        role: InterfaceRole,
    ) -> ManagerResult<Vec<ConnectionId>> {
        Ok(self.interface(location, role)?.connections.clone())
    }

    // ---- 连接登记 ----

    /// 把连接标识同时登记到多个接口
    ///
    /// 先检查全部目标再写入，任何一个失败都不会留下部分登记。
    pub fn register_connection(
        &mut self,
        id: ConnectionId,
        targets: &[(InterfaceLocation, InterfaceRole)],
    ) -> ManagerResult<()> {
        for (location, role) in targets {
            let entry = self.interface(location, *role)?;
            if entry.connections.contains(&id) {
                return Err(ManagerError::already_exists(format!(
                    "连接 {id} 已登记在{role}: {location}"
                )));
            }
            if *role == InterfaceRole::Required && !entry.connections.is_empty() {
                return Err(ManagerError::invalid_state(format!(
                    "所需/输入接口已绑定连接 {:?}，不能再登记连接 {id}: {location}",
                    entry.connections
                )));
            }
        }
        for (location, role) in targets {
            let entry = self.interface_mut(location, *role)?;
            entry.connections.push(id);
        }
        Ok(())
    }

    /// 从多个接口撤销连接标识，返回实际撤销的数量
    ///
    /// 已不存在的接口直接跳过。
    pub fn unregister_connection(
        &mut self,
        id: ConnectionId,
        targets: &[(InterfaceLocation, InterfaceRole)],
    ) -> usize {
        let mut removed = 0;
        for (location, role) in targets {
            if let Ok(entry) = self.interface_mut(location, *role) {
                let before = entry.connections.len();
                entry.connections.retain(|existing| *existing != id);
                removed += before - entry.connections.len();
            }
        }
        removed
    }

    // ---- 内部辅助 ----

    fn process_mut(&mut self, process: &str) -> ManagerResult<&mut ProcessEntry> {
        if !self.processes.contains_key(process) {
            return Err(self.missing_process(process));
        }
        self.processes
            .get_mut(process)
            .ok_or_else(|| ManagerError::internal(format!("进程条目消失: {process}")))
    }

    fn component_mut(
        &mut self,
        process: &str,
        component: &str,
    ) -> ManagerResult<&mut ComponentEntry> {
        // 先用只读路径生成带候选项的错误信息
        self.component(process, component)?;
        self.processes
            .get_mut(process)
            .and_then(|entry| entry.components.get_mut(component))
            .ok_or_else(|| ManagerError::internal(format!("组件条目消失: {process}:{component}")))
    }

    fn interface_mut(
        &mut self,
        location: &InterfaceLocation,
        role: InterfaceRole,
    ) -> ManagerResult<&mut InterfaceEntry> {
        self.interface(location, role)?;
        self.component_mut(&location.process, &location.component)?
            .interfaces_mut(role)
            .get_mut(&location.interface)
            .ok_or_else(|| ManagerError::internal(format!("接口条目消失: {location}")))
    }

    fn missing_process(&self, process: &str) -> ManagerError {
        ManagerError::not_found(format!(
            "进程不存在: {process}；{}",
            describe_available(&self.process_names(), "当前没有已注册的进程")
        ))
    }
}

fn missing_component(process: &str, component: &str, entry: &ProcessEntry) -> ManagerError {
    ManagerError::not_found(format!(
        "组件不存在: {process}:{component}；{}",
        describe_available(&entry.component_names(), "该进程没有已注册的组件")
    ))
}
