//! Core domain models for the workflow engine.
//!
//! A workflow is a single root [`Module`]. Modules are declared directly in
//! JSON; [`crate::dag::validate`] checks them structurally before execution.

use serde::{Deserialize, Serialize};
use staging::{ModuleKind, ModuleLookup};
use trace::{Element, ExecutionTrace};

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

/// One side of a connection inside a composite module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Child module name, or `None` for a port of the enclosing composite.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    pub port: String,
}

impl Endpoint {
    pub fn child(module: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            module: Some(module.into()),
            port: port.into(),
        }
    }

    pub fn parent(port: impl Into<String>) -> Self {
        Self {
            module: None,
            port: port.into(),
        }
    }
}

/// Directed data connection.
///
/// `from` is a composite in-port or a child out-port; `to` is a child in-port
/// or a composite out-port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub from: Endpoint,
    pub to: Endpoint,
}

// ---------------------------------------------------------------------------
// Module
// ---------------------------------------------------------------------------

/// What a module does when it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModuleBody {
    /// Leaf module executed by a registered `SimpleModule` implementation.
    Simple { module_type: String },
    /// Graph of child modules.
    Composite {
        children: Vec<Module>,
        #[serde(default)]
        connections: Vec<Connection>,
    },
    /// Runs `body` once per iteration until it stops asking for more.
    Loop { body: Box<Module> },
    /// Runs `target` in place of itself.
    Proxy { target: Box<Module> },
}

/// A workflow module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    #[serde(default)]
    pub in_ports: Vec<String>,
    #[serde(default)]
    pub out_ports: Vec<String>,
    #[serde(flatten)]
    pub body: ModuleBody,
}

impl Module {
    pub fn simple(
        name: impl Into<String>,
        module_type: impl Into<String>,
        in_ports: &[&str],
        out_ports: &[&str],
    ) -> Self {
        Self {
            name: name.into(),
            in_ports: in_ports.iter().map(|p| p.to_string()).collect(),
            out_ports: out_ports.iter().map(|p| p.to_string()).collect(),
            body: ModuleBody::Simple {
                module_type: module_type.into(),
            },
        }
    }

    pub fn composite(
        name: impl Into<String>,
        in_ports: &[&str],
        out_ports: &[&str],
        children: Vec<Module>,
        connections: Vec<Connection>,
    ) -> Self {
        Self {
            name: name.into(),
            in_ports: in_ports.iter().map(|p| p.to_string()).collect(),
            out_ports: out_ports.iter().map(|p| p.to_string()).collect(),
            body: ModuleBody::Composite {
                children,
                connections,
            },
        }
    }

    /// Loop with the same ports as its body.
    pub fn looping(name: impl Into<String>, body: Module) -> Self {
        Self {
            name: name.into(),
            in_ports: body.in_ports.clone(),
            out_ports: body.out_ports.clone(),
            body: ModuleBody::Loop {
                body: Box::new(body),
            },
        }
    }

    /// Proxy with the same ports as its target.
    pub fn proxy(name: impl Into<String>, target: Module) -> Self {
        Self {
            name: name.into(),
            in_ports: target.in_ports.clone(),
            out_ports: target.out_ports.clone(),
            body: ModuleBody::Proxy {
                target: Box::new(target),
            },
        }
    }

    pub fn kind(&self) -> ModuleKind {
        match self.body {
            ModuleBody::Simple { .. } => ModuleKind::Simple,
            ModuleBody::Composite { .. } => ModuleKind::Composite,
            ModuleBody::Loop { .. } => ModuleKind::Loop,
            ModuleBody::Proxy { .. } => ModuleKind::Proxy,
        }
    }

    pub fn child(&self, name: &str) -> Option<&Module> {
        match &self.body {
            ModuleBody::Composite { children, .. } => children.iter().find(|c| c.name == name),
            _ => None,
        }
    }

    /// The module whose content is staged below this one's content element:
    /// proxies are followed to their final target.
    fn content_owner(&self) -> &Module {
        let mut module = self;
        while let ModuleBody::Proxy { target } = &module.body {
            module = target;
        }
        module
    }

    /// The module referenced by the frames of an absolute trace, where the
    /// first module element names this (root) module.
    pub fn resolve(&self, trace: &ExecutionTrace) -> Option<&Module> {
        let frames = trace.frames();
        let mut elements = frames.elements().iter();
        let mut current = match elements.next()? {
            Element::Module(name) if name.as_str() == self.name => self,
            _ => return None,
        };
        while let Some(element) = elements.next() {
            if *element != Element::Content {
                return None;
            }
            let owner = current.content_owner();
            current = match (elements.next()?, &owner.body) {
                (Element::Module(name), ModuleBody::Composite { .. }) => {
                    owner.child(name.as_str())?
                }
                (Element::Iteration(_), ModuleBody::Loop { body }) => body.as_ref(),
                _ => return None,
            };
        }
        Some(current)
    }
}

impl ModuleLookup for Module {
    fn module_kind(&self, trace: &ExecutionTrace) -> Option<ModuleKind> {
        self.resolve(trace).map(Module::kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn workflow() -> Module {
        let body = Module::composite(
            "body",
            &["n"],
            &["n", "continue"],
            vec![Module::simple("step", "countdown", &["n"], &["n", "continue"])],
            vec![],
        );
        Module::composite(
            "main",
            &[],
            &[],
            vec![
                Module::looping("repeat", body),
                Module::proxy(
                    "alias",
                    Module::composite(
                        "inner",
                        &[],
                        &[],
                        vec![Module::simple("leaf", "identity", &[], &[])],
                        vec![],
                    ),
                ),
            ],
            vec![],
        )
    }

    fn kind(trace: &str) -> Option<ModuleKind> {
        workflow().module_kind(&ExecutionTrace::parse(trace).unwrap())
    }

    #[test]
    fn lookup_walks_composites_loops_and_proxies() {
        assert_eq!(kind("main"), Some(ModuleKind::Composite));
        assert_eq!(kind("main/repeat"), Some(ModuleKind::Loop));
        assert_eq!(kind("main/repeat/4"), Some(ModuleKind::Composite));
        assert_eq!(kind("main/repeat/4/step"), Some(ModuleKind::Simple));
        assert_eq!(kind("main/repeat/4/step:out:n"), Some(ModuleKind::Simple));
        assert_eq!(kind("main/alias"), Some(ModuleKind::Proxy));
        assert_eq!(kind("main/alias/leaf"), Some(ModuleKind::Simple));
    }

    #[test]
    fn lookup_rejects_unknown_frames() {
        assert_eq!(kind("other"), None);
        assert_eq!(kind("main/ghost"), None);
        assert_eq!(kind("main/3"), None);
        assert_eq!(kind("/main"), None);
    }

    #[test]
    fn modules_deserialize_from_tagged_json() {
        let module: Module = serde_json::from_value(json!({
            "name": "add",
            "in_ports": ["a", "b"],
            "out_ports": ["sum"],
            "kind": "simple",
            "module_type": "sum"
        }))
        .unwrap();
        assert_eq!(module, Module::simple("add", "sum", &["a", "b"], &["sum"]));
    }
}
