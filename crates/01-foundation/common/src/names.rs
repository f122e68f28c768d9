//! 命名约定
//!
//! 代理组件、管理器组件和内部接口的名称都由这里的函数统一生成，
//! GCM 与 LCM 两侧必须得到相同的结果。

/// 全局组件管理器名称
pub const GLOBAL_MANAGER_NAME: &str = "GlobalComponentManager";

/// 本地组件管理器默认进程名
pub const DEFAULT_PROCESS_NAME: &str = "LCM";

/// 与 GCM 同进程运行的 LCM 进程名
pub const GCM_PROCESS_NAME: &str = "GCM";

/// 管理器组件服务端名称
pub const MANAGER_COMPONENT_SERVER_NAME: &str = "MCS";

/// 管理器组件客户端名称后缀
const MANAGER_COMPONENT_CLIENT_SUFFIX: &str = "_MCC";

/// 组件代理名称后缀
const PROXY_SUFFIX: &str = "Proxy";

/// 用户组件内部提供接口名称
pub const INTERFACE_INTERNAL_PROVIDED: &str = "InterfaceInternal";

/// 管理器组件客户端为每个用户组件创建的所需接口名称前缀
const INTERFACE_COMPONENT_REQUIRED_PREFIX: &str = "InterfaceComponentRequired";

/// 生成组件代理名称
///
/// 已经是代理名称时原样返回，因此该函数是幂等的。
pub fn component_proxy_name(process: &str, component: &str) -> String {
    if is_proxy_component_name(component) {
        return component.to_string();
    }
    format!("{process}.{component}{PROXY_SUFFIX}")
}

/// 判断名称是否符合组件代理命名约定
pub fn is_proxy_component_name(component: &str) -> bool {
    component.ends_with(PROXY_SUFFIX)
}

/// 生成接口唯一标识 `P:C:I`
pub fn interface_uid(process: &str, component: &str, interface: &str) -> String {
    format!("{process}:{component}:{interface}")
}

/// 生成指定进程的管理器组件客户端名称
pub fn manager_component_client_name(process: &str) -> String {
    format!("{process}{MANAGER_COMPONENT_CLIENT_SUFFIX}")
}

/// 生成管理器组件客户端为用户组件创建的所需接口名称
pub fn interface_component_required_for(component: &str) -> String {
    format!("{INTERFACE_COMPONENT_REQUIRED_PREFIX}For{component}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_proxy_name_is_idempotent() {
        let name = component_proxy_name("P2", "Sink");
        assert_eq!(name, "P2.SinkProxy");
        assert_eq!(component_proxy_name("P2", &name), name);
        assert!(is_proxy_component_name(&name));
        assert!(!is_proxy_component_name("Sink"));
    }

    #[test]
    fn test_manager_names() {
        assert_eq!(interface_uid("P", "C", "I"), "P:C:I");
        assert_eq!(manager_component_client_name("P1"), "P1_MCC");
        assert_eq!(
            interface_component_required_for("Source"),
            "InterfaceComponentRequiredForSource"
        );
    }
}
