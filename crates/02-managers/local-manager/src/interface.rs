//! 本地接口对象与本地绑定

use manager_common::{
    describe_available, CommandDescription, CommandKind, ConnectionId, EventGeneratorDescription,
    EventHandlerDescription, EventKind, FunctionDescription, InterfaceProvidedDescription,
    InterfaceRequiredDescription, ManagerError, ManagerResult,
};
use std::collections::BTreeSet;
use tracing::warn;

/// 提供/输出接口
#[derive(Debug, Clone)]
pub struct InterfaceProvided {
    description: InterfaceProvidedDescription,
    registered: bool,
    user_count: usize,
    connections: BTreeSet<ConnectionId>,
    endpoint: Option<String>,
}

impl InterfaceProvided {
    /// 按描述创建提供接口
    pub fn new(description: InterfaceProvidedDescription) -> Self {
        Self {
            description,
            registered: false,
            user_count: 0,
            connections: BTreeSet::new(),
            endpoint: None,
        }
    }

    /// 接口名
    pub fn name(&self) -> &str {
        &self.description.interface_name
    }

    /// 接口描述
    pub fn description(&self) -> &InterfaceProvidedDescription {
        &self.description
    }

    /// 是否已在 GCM 注册
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub(crate) fn mark_registered(&mut self) {
        self.registered = true;
    }

    /// 绑定到该接口的所需接口数量
    pub fn user_count(&self) -> usize {
        self.user_count
    }

    /// 使用该接口的连接
    pub fn connections(&self) -> &BTreeSet<ConnectionId> {
        &self.connections
    }

    /// 代理接口的访问端点
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub(crate) fn set_endpoint(&mut self, endpoint: String) {
        self.endpoint = Some(endpoint);
    }

    pub(crate) fn add_user(&mut self, id: ConnectionId) {
        if self.connections.insert(id) {
            self.user_count += 1;
        }
    }

    pub(crate) fn remove_user(&mut self, id: ConnectionId) -> bool {
        if self.connections.remove(&id) {
            self.user_count = self.user_count.saturating_sub(1);
            return true;
        }
        false
    }

    /// 命令名
    pub fn command_names(&self) -> Vec<String> {
        self.description
            .commands
            .iter()
            .map(|command| command.name.clone())
            .collect()
    }

    /// 事件生成器名
    pub fn event_generator_names(&self) -> Vec<String> {
        self.description
            .event_generators
            .iter()
            .map(|event| event.name.clone())
            .collect()
    }
}

/// 所需接口绑定到的提供接口
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// 连接标识
    pub id: ConnectionId,
    /// 提供接口所在组件（可能是代理组件）
    pub component: String,
    /// 提供接口名
    pub interface: String,
}

/// 所需/输入接口
#[derive(Debug, Clone)]
pub struct InterfaceRequired {
    description: InterfaceRequiredDescription,
    registered: bool,
    binding: Option<Binding>,
}

impl InterfaceRequired {
    /// 按描述创建所需接口
    pub fn new(description: InterfaceRequiredDescription) -> Self {
        Self {
            description,
            registered: false,
            binding: None,
        }
    }

    /// 接口名
    pub fn name(&self) -> &str {
        &self.description.interface_name
    }

    /// 接口描述
    pub fn description(&self) -> &InterfaceRequiredDescription {
        &self.description
    }

    /// 是否已在 GCM 注册
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub(crate) fn mark_registered(&mut self) {
        self.registered = true;
    }

    /// 当前绑定
    pub fn binding(&self) -> Option<&Binding> {
        self.binding.as_ref()
    }

    pub(crate) fn bind(&mut self, binding: Binding) {
        self.binding = Some(binding);
    }

    pub(crate) fn take_binding_of(&mut self, id: ConnectionId) -> Option<Binding> {
        if self.binding.as_ref().is_some_and(|binding| binding.id == id) {
            return self.binding.take();
        }
        None
    }

    /// 函数名
    pub fn function_names(&self) -> Vec<String> {
        self.description
            .functions
            .iter()
            .map(|function| function.name.clone())
            .collect()
    }

    /// 事件处理器名
    pub fn event_handler_names(&self) -> Vec<String> {
        self.description
            .event_handlers
            .iter()
            .map(|handler| handler.name.clone())
            .collect()
    }
}

/// 检查所需接口能否绑定到提供接口
///
/// 每个函数都必须有同名同类别的命令；缺少对应事件生成器的事件处理器只告警。
pub fn check_compatibility(
    required: &InterfaceRequiredDescription,
    provided: &InterfaceProvidedDescription,
) -> ManagerResult<()> {
    let commands: Vec<String> = provided
        .commands
        .iter()
        .map(|command| command.name.clone())
        .collect();

    for function in &required.functions {
        match provided.find_command(&function.name) {
            Some(command) if command.kind == function.kind => {}
            Some(command) => {
                return Err(ManagerError::invalid_state(format!(
                    "函数 {} 的类别 {:?} 与命令的类别 {:?} 不一致",
                    function.name, function.kind, command.kind
                )));
            }
            None => {
                return Err(ManagerError::not_found(format!(
                    "提供接口 {} 没有命令 {}；{}",
                    provided.interface_name,
                    function.name,
                    describe_available(&commands, "该接口没有命令")
                )));
            }
        }
    }

    for handler in &required.event_handlers {
        match provided.find_event_generator(&handler.name) {
            Some(event) if event.kind != handler.kind => {
                return Err(ManagerError::invalid_state(format!(
                    "事件处理器 {} 的类别 {:?} 与事件生成器的类别 {:?} 不一致",
                    handler.name, handler.kind, event.kind
                )));
            }
            Some(_) => {}
            None => warn!(
                "提供接口 {} 没有事件生成器 {}，事件处理器不会被触发",
                provided.interface_name, handler.name
            ),
        }
    }
    Ok(())
}

/// 管理器组件客户端控制用户组件所用的命令
const INTERNAL_COMMANDS: [(&str, CommandKind); 4] = [
    ("GetState", CommandKind::Read),
    ("Create", CommandKind::Void),
    ("Start", CommandKind::Void),
    ("Kill", CommandKind::Void),
];

/// 用户组件内部提供接口的描述
pub fn internal_interface_description(interface_name: &str) -> InterfaceProvidedDescription {
    INTERNAL_COMMANDS
        .iter()
        .fold(
            InterfaceProvidedDescription::new(interface_name),
            |description, (name, kind)| {
                description.with_command(
                    CommandDescription::new(*name, *kind).with_argument_prototype("ComponentState"),
                )
            },
        )
        .with_event_generator(EventGeneratorDescription::new("ChangeState", EventKind::Write))
}

/// 管理器组件客户端为用户组件创建的所需接口描述
pub fn manager_client_required_description(interface_name: &str) -> InterfaceRequiredDescription {
    INTERNAL_COMMANDS
        .iter()
        .fold(
            InterfaceRequiredDescription::new(interface_name),
            |description, (name, kind)| {
                description.with_function(FunctionDescription::new(*name, *kind))
            },
        )
        .with_event_handler(EventHandlerDescription::new("ChangeState", EventKind::Write))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provided() -> InterfaceProvidedDescription {
        InterfaceProvidedDescription::new("Provided")
            .with_command(CommandDescription::new("GetPosition", CommandKind::Read))
            .with_command(CommandDescription::new("Reset", CommandKind::Void))
            .with_event_generator(EventGeneratorDescription::new("Moved", EventKind::Void))
    }

    #[test]
    fn test_compatible_interfaces() {
        let required = InterfaceRequiredDescription::new("Required")
            .with_function(FunctionDescription::new("GetPosition", CommandKind::Read))
            .with_event_handler(EventHandlerDescription::new("Moved", EventKind::Void))
            .with_event_handler(EventHandlerDescription::new("Unknown", EventKind::Void));
        assert!(check_compatibility(&required, &provided()).is_ok());
    }

    #[test]
    fn test_missing_command_lists_available() {
        let required = InterfaceRequiredDescription::new("Required")
            .with_function(FunctionDescription::new("GetPositon", CommandKind::Read));
        let error = check_compatibility(&required, &provided()).unwrap_err();
        assert!(matches!(error, ManagerError::NotFound { .. }));
        assert!(error.message().contains("GetPosition"));
        assert!(error.message().contains("Reset"));
    }

    #[test]
    fn test_kind_mismatch() {
        let required = InterfaceRequiredDescription::new("Required")
            .with_function(FunctionDescription::new("Reset", CommandKind::Write));
        assert!(matches!(
            check_compatibility(&required, &provided()),
            Err(ManagerError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_manager_client_matches_internal_interface() {
        let provided = internal_interface_description("InterfaceInternal");
        let required = manager_client_required_description("InterfaceComponentRequiredForSink");
        assert!(check_compatibility(&required, &provided).is_ok());
    }

    #[test]
    fn test_user_counter() {
        let mut interface = InterfaceProvided::new(provided());
        interface.add_user(ConnectionId(1));
        interface.add_user(ConnectionId(1));
        interface.add_user(ConnectionId(2));
        assert_eq!(interface.user_count(), 2);
        assert!(interface.remove_user(ConnectionId(1)));
        assert!(!interface.remove_user(ConnectionId(1)));
        assert_eq!(interface.user_count(), 1);
    }
}
