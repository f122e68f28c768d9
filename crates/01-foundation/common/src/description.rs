//! 接口描述
//!
//! 进程在编译期并不知道远端组件的类型。GCM 从接口所属的 LCM 取得完整描述，
//! 再交给对端 LCM 创建类型兼容的代理接口。参数原型以序列化字符串的形式携带。

use serde::{Deserialize, Serialize};

/// 命令类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    /// 无参数
    Void,
    /// 写入一个参数
    Write,
    /// 读取一个结果
    Read,
    /// 带限定参数的读取
    QualifiedRead,
    /// 无参数带返回值
    VoidReturn,
    /// 写入参数并带返回值
    WriteReturn,
}

/// 事件类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// 无负载事件
    Void,
    /// 携带负载的事件
    Write,
}

/// 提供接口中的一个命令
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDescription {
    /// 命令名
    pub name: String,
    /// 命令类别
    pub kind: CommandKind,
    /// 序列化的参数原型
    #[serde(default)]
    pub argument_prototype: Option<String>,
}

impl CommandDescription {
    /// 创建新的命令描述
    pub fn new(name: impl Into<String>, kind: CommandKind) -> Self {
        Self {
            name: name.into(),
            kind,
            argument_prototype: None,
        }
    }

    /// 设置参数原型
    pub fn with_argument_prototype(mut self, prototype: impl Into<String>) -> Self {
        self.argument_prototype = Some(prototype.into());
        self
    }
}

/// 提供接口中的一个事件生成器
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventGeneratorDescription {
    /// 事件名
    pub name: String,
    /// 事件类别
    pub kind: EventKind,
    /// 序列化的参数原型
    #[serde(default)]
    pub argument_prototype: Option<String>,
}

impl EventGeneratorDescription {
    /// 创建新的事件生成器描述
    pub fn new(name: impl Into<String>, kind: EventKind) -> Self {
        Self {
            name: name.into(),
            kind,
            argument_prototype: None,
        }
    }
}

/// 所需接口中的一个函数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDescription {
    /// 函数名，与提供接口中的命令名对应
    pub name: String,
    /// 期望的命令类别
    pub kind: CommandKind,
}

impl FunctionDescription {
    /// 创建新的函数描述
    pub fn new(name: impl Into<String>, kind: CommandKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// 所需接口中的一个事件处理器
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHandlerDescription {
    /// 事件名，与提供接口中的事件生成器对应
    pub name: String,
    /// 事件类别
    pub kind: EventKind,
    /// 序列化的参数原型
    #[serde(default)]
    pub argument_prototype: Option<String>,
}

impl EventHandlerDescription {
    /// 创建新的事件处理器描述
    pub fn new(name: impl Into<String>, kind: EventKind) -> Self {
        Self {
            name: name.into(),
            kind,
            argument_prototype: None,
        }
    }
}

/// 提供/输出接口的完整描述
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InterfaceProvidedDescription {
    /// 接口名
    pub interface_name: String,
    /// 命令
    pub commands: Vec<CommandDescription>,
    /// 事件生成器
    pub event_generators: Vec<EventGeneratorDescription>,
}

impl InterfaceProvidedDescription {
    /// 创建空的提供接口描述
    pub fn new(interface_name: impl Into<String>) -> Self {
        Self {
            interface_name: interface_name.into(),
            ..Self::default()
        }
    }

    /// 添加命令
    pub fn with_command(mut self, command: CommandDescription) -> Self {
        self.commands.push(command);
        self
    }

    /// 添加事件生成器
    pub fn with_event_generator(mut self, event: EventGeneratorDescription) -> Self {
        self.event_generators.push(event);
        self
    }

    /// 按名称查找命令
    pub fn find_command(&self, name: &str) -> Option<&CommandDescription> {
        self.commands.iter().find(|command| command.name == name)
    }

    /// 按名称查找事件生成器
    pub fn find_event_generator(&self, name: &str) -> Option<&EventGeneratorDescription> {
        self.event_generators.iter().find(|event| event.name == name)
    }
}

/// 所需/输入接口的完整描述
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InterfaceRequiredDescription {
    /// 接口名
    pub interface_name: String,
    /// 函数
    pub functions: Vec<FunctionDescription>,
    /// 事件处理器
    pub event_handlers: Vec<EventHandlerDescription>,
}

impl InterfaceRequiredDescription {
    /// 创建空的所需接口描述
    pub fn new(interface_name: impl Into<String>) -> Self {
        Self {
            interface_name: interface_name.into(),
            ..Self::default()
        }
    }

    /// 添加函数
    pub fn with_function(mut self, function: FunctionDescription) -> Self {
        self.functions.push(function);
        self
    }

    /// 添加事件处理器
    pub fn with_event_handler(mut self, handler: EventHandlerDescription) -> Self {
        self.event_handlers.push(handler);
        self
    }
}
