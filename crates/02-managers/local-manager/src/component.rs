//! 本地组件表中的组件

use async_trait::async_trait;
use manager_common::{
    describe_available, ComponentKind, ComponentState, InterfaceProvidedDescription,
    InterfaceRequiredDescription, ManagerError, ManagerResult,
};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::interface::{InterfaceProvided, InterfaceRequired};

/// 组件生命周期钩子
///
/// 由使用连接子系统的组件实现，LCM 在 `CreateAll` / `StartAll` / `KillAll` 时调用。
#[async_trait]
pub trait ComponentBehavior: Send + Sync {
    /// 创建
    async fn create(&self, _component: &str) -> ManagerResult<()> {
        Ok(())
    }

    /// 启动
    async fn start(&self, _component: &str) -> ManagerResult<()> {
        Ok(())
    }

    /// 结束
    async fn kill(&self, _component: &str) -> ManagerResult<()> {
        Ok(())
    }
}

/// 组件
#[derive(Clone)]
pub struct Component {
    name: String,
    kind: ComponentKind,
    state: ComponentState,
    provided: BTreeMap<String, InterfaceProvided>,
    required: BTreeMap<String, InterfaceRequired>,
    behavior: Option<Arc<dyn ComponentBehavior>>,
}

impl Component {
    /// 创建普通用户组件
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_kind(name, ComponentKind::Generic)
    }

    /// 创建指定类别的组件
    pub fn with_kind(name: impl Into<String>, kind: ComponentKind) -> Self {
        Self {
            name: name.into(),
            kind,
            state: ComponentState::Constructed,
            provided: BTreeMap::new(),
            required: BTreeMap::new(),
            behavior: None,
        }
    }

    /// 添加提供接口
    pub fn with_interface_provided(mut self, description: InterfaceProvidedDescription) -> Self {
        self.provided.insert(
            description.interface_name.clone(),
            InterfaceProvided::new(description),
        );
        self
    }

    /// 添加所需接口
    pub fn with_interface_required(mut self, description: InterfaceRequiredDescription) -> Self {
        self.required.insert(
            description.interface_name.clone(),
            InterfaceRequired::new(description),
        );
        self
    }

    /// 设置生命周期钩子
    pub fn with_behavior(mut self, behavior: Arc<dyn ComponentBehavior>) -> Self {
        self.behavior = Some(behavior);
        self
    }

    /// 组件名
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 组件类别
    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    /// 生命周期状态
    pub fn state(&self) -> ComponentState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ComponentState) {
        self.state = state;
    }

    pub(crate) fn behavior(&self) -> Option<Arc<dyn ComponentBehavior>> {
        self.behavior.clone()
    }

    /// 添加提供接口，同名接口已存在时失败
    pub fn add_interface_provided(&mut self, interface: InterfaceProvided) -> ManagerResult<()> {
        if self.provided.contains_key(interface.name()) {
            return Err(ManagerError::already_exists(format!(
                "提供接口已存在: {}:{}",
                self.name,
                interface.name()
            )));
        }
        self.provided.insert(interface.name().to_string(), interface);
        Ok(())
    }

    /// 添加所需接口，同名接口已存在时失败
    pub fn add_interface_required(&mut self, interface: InterfaceRequired) -> ManagerResult<()> {
        if self.required.contains_key(interface.name()) {
            return Err(ManagerError::already_exists(format!(
                "所需接口已存在: {}:{}",
                self.name,
                interface.name()
            )));
        }
        self.required.insert(interface.name().to_string(), interface);
        Ok(())
    }

    /// 提供接口
    pub fn interface_provided(&self, name: &str) -> ManagerResult<&InterfaceProvided> {
        self.provided.get(name).ok_or_else(|| {
            ManagerError::not_found(format!(
                "组件 {} 没有提供接口 {name}；{}",
                self.name,
                describe_available(&self.interface_provided_names(), "该组件没有提供接口")
            ))
        })
    }

    /// 所需接口
    pub fn interface_required(&self, name: &str) -> ManagerResult<&InterfaceRequired> {
        self.required.get(name).ok_or_else(|| {
            ManagerError::not_found(format!(
                "组件 {} 没有所需接口 {name}；{}",
                self.name,
                describe_available(&self.interface_required_names(), "该组件没有所需接口")
            ))
        })
    }

    pub(crate) fn interface_provided_mut(
        &mut self,
        name: &str,
    ) -> ManagerResult<&mut InterfaceProvided> {
        self.interface_provided(name)?;
        self.provided
            .get_mut(name)
            .ok_or_else(|| ManagerError::internal(format!("提供接口消失: {}:{name}", self.name)))
    }

    pub(crate) fn interface_required_mut(
        &mut self,
        name: &str,
    ) -> ManagerResult<&mut InterfaceRequired> {
        self.interface_required(name)?;
        self.required
            .get_mut(name)
            .ok_or_else(|| ManagerError::internal(format!("所需接口消失: {}:{name}", self.name)))
    }

    pub(crate) fn remove_interface_provided(&mut self, name: &str) -> Option<InterfaceProvided> {
        self.provided.remove(name)
    }

    pub(crate) fn remove_interface_required(&mut self, name: &str) -> Option<InterfaceRequired> {
        self.required.remove(name)
    }

    pub(crate) fn interfaces_required_mut(
        &mut self,
    ) -> impl Iterator<Item = &mut InterfaceRequired> {
        self.required.values_mut()
    }

    pub(crate) fn interfaces_provided_mut(
        &mut self,
    ) -> impl Iterator<Item = &mut InterfaceProvided> {
        self.provided.values_mut()
    }

    /// 提供接口名
    pub fn interface_provided_names(&self) -> Vec<String> {
        self.provided.keys().cloned().collect()
    }

    /// 所需接口名
    pub fn interface_required_names(&self) -> Vec<String> {
        self.required.keys().cloned().collect()
    }

    /// 尚未在 GCM 注册的接口名（提供，所需）
    pub fn unregistered_interfaces(&self) -> (Vec<String>, Vec<String>) {
        let provided = self
            .provided
            .values()
            .filter(|interface| !interface.is_registered())
            .map(|interface| interface.name().to_string())
            .collect();
        let required = self
            .required
            .values()
            .filter(|interface| !interface.is_registered())
            .map(|interface| interface.name().to_string())
            .collect();
        (provided, required)
    }

    pub(crate) fn mark_registered(&mut self, provided: &[String], required: &[String]) {
        for name in provided {
            if let Some(interface) = self.provided.get_mut(name) {
                interface.mark_registered();
            }
        }
        for name in required {
            if let Some(interface) = self.required.get_mut(name) {
                interface.mark_registered();
            }
        }
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("provided", &self.provided.keys().collect::<Vec<_>>())
            .field("required", &self.required.keys().collect::<Vec<_>>())
            .field("has_behavior", &self.behavior.is_some())
            .finish()
    }
}
