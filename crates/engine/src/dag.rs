//! Module validation. Run this before executing a workflow.
//!
//! Rules enforced, recursively for every module:
//! 1. Module and port names are identifiers usable in execution traces.
//! 2. Port names are unique per direction; child names are unique within a
//!    composite.
//! 3. Every connection references existing children and ports, in the right
//!    direction, and no input is fed by two connections.
//! 4. The child graph of a composite is acyclic (topological sort must succeed).
//! 5. Loops and proxies only expose ports their body or target has.

use std::collections::{HashMap, HashSet, VecDeque};

use trace::Name;

use crate::models::{Connection, Endpoint, Module, ModuleBody};
use crate::EngineError;

/// Validate `module` and everything below it.
pub fn validate(module: &Module) -> Result<(), EngineError> {
    Name::new(module.name.as_str())?;
    check_ports(module, &module.in_ports)?;
    check_ports(module, &module.out_ports)?;

    match &module.body {
        ModuleBody::Simple { .. } => Ok(()),
        ModuleBody::Composite { children, .. } => {
            for child in children {
                validate(child)?;
            }
            validate_dag(module).map(drop)
        }
        ModuleBody::Loop { body } => {
            validate(body)?;
            check_exposed(module, body)
        }
        ModuleBody::Proxy { target } => {
            validate(target)?;
            check_exposed(module, target)
        }
    }
}

fn check_ports(module: &Module, ports: &[String]) -> Result<(), EngineError> {
    let mut seen = HashSet::new();
    for port in ports {
        Name::new(port.as_str())?;
        if !seen.insert(port.as_str()) {
            return Err(EngineError::DuplicatePort {
                module: module.name.clone(),
                port: port.clone(),
            });
        }
    }
    Ok(())
}

fn check_exposed(outer: &Module, inner: &Module) -> Result<(), EngineError> {
    let missing = outer
        .in_ports
        .iter()
        .find(|p| !inner.in_ports.contains(p))
        .or_else(|| outer.out_ports.iter().find(|p| !inner.out_ports.contains(p)));
    match missing {
        Some(port) => Err(EngineError::PortMismatch {
            module: outer.name.clone(),
            port: port.clone(),
            inner: inner.name.clone(),
        }),
        None => Ok(()),
    }
}

/// Validate the child graph of a composite and return its children in
/// topological execution order. Independent children keep their declaration
/// order.
///
/// # Errors
/// - [`EngineError::DuplicateModuleName`] if two children share a name.
/// - [`EngineError::UnknownModuleReference`] if a connection names a missing child.
/// - [`EngineError::UnknownPort`] if a connection names a missing port.
/// - [`EngineError::DuplicateConnection`] if an input is fed twice.
/// - [`EngineError::CycleDetected`] if the graph is not acyclic.
pub fn validate_dag(composite: &Module) -> Result<Vec<&Module>, EngineError> {
    let (children, connections) = match &composite.body {
        ModuleBody::Composite {
            children,
            connections,
        } => (children, connections),
        _ => return Ok(Vec::new()),
    };

    // -----------------------------------------------------------------------
    // 1. Ensure child names are unique
    // -----------------------------------------------------------------------
    let mut by_name: HashMap<&str, &Module> = HashMap::new();
    for child in children {
        if by_name.insert(child.name.as_str(), child).is_some() {
            return Err(EngineError::DuplicateModuleName {
                parent: composite.name.clone(),
                name: child.name.clone(),
            });
        }
    }

    // -----------------------------------------------------------------------
    // 2. Validate connection endpoints
    // -----------------------------------------------------------------------
    let mut fed: HashSet<&Endpoint> = HashSet::new();
    for connection in connections {
        check_endpoint(composite, &by_name, &connection.from, Side::From)?;
        check_endpoint(composite, &by_name, &connection.to, Side::To)?;
        if !fed.insert(&connection.to) {
            return Err(EngineError::DuplicateConnection {
                module: connection.to.module.clone().unwrap_or_else(|| composite.name.clone()),
                port: connection.to.port.clone(),
            });
        }
    }

    // -----------------------------------------------------------------------
    // 3. Topological sort (Kahn's algorithm)
    // -----------------------------------------------------------------------
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> =
        children.iter().map(|c| (c.name.as_str(), 0)).collect();

    for (from, to) in connections.iter().filter_map(child_edge) {
        adjacency.entry(from).or_default().push(to);
        *in_degree.entry(to).or_insert(0) += 1;
    }

    // Seed the queue with children that have no incoming edges.
    let mut queue: VecDeque<&str> = children
        .iter()
        .map(|c| c.name.as_str())
        .filter(|name| in_degree[name] == 0)
        .collect();

    let mut sorted: Vec<&Module> = Vec::with_capacity(children.len());

    while let Some(name) = queue.pop_front() {
        sorted.push(by_name[name]);

        if let Some(neighbours) = adjacency.get(name) {
            for &neighbour in neighbours {
                let deg = in_degree.entry(neighbour).or_insert(0);
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(neighbour);
                }
            }
        }
    }

    // If we didn't visit every child the graph contains a cycle.
    if sorted.len() != children.len() {
        return Err(EngineError::CycleDetected {
            module: composite.name.clone(),
        });
    }

    Ok(sorted)
}

#[derive(Debug, Clone, Copy)]
enum Side {
    From,
    To,
}

impl Side {
    fn label(self) -> &'static str {
        match self {
            Side::From => "from",
            Side::To => "to",
        }
    }
}

fn check_endpoint(
    composite: &Module,
    children: &HashMap<&str, &Module>,
    endpoint: &Endpoint,
    side: Side,
) -> Result<(), EngineError> {
    // A child's out-port feeds, a child's in-port is fed; the composite's own
    // ports are the other way round.
    let (owner, ports) = match &endpoint.module {
        Some(name) => {
            let child = children.get(name.as_str()).ok_or_else(|| {
                EngineError::UnknownModuleReference {
                    module: name.clone(),
                    side: side.label(),
                }
            })?;
            let ports = match side {
                Side::From => &child.out_ports,
                Side::To => &child.in_ports,
            };
            (&child.name, ports)
        }
        None => {
            let ports = match side {
                Side::From => &composite.in_ports,
                Side::To => &composite.out_ports,
            };
            (&composite.name, ports)
        }
    };
    if !ports.contains(&endpoint.port) {
        return Err(EngineError::UnknownPort {
            module: owner.clone(),
            port: endpoint.port.clone(),
            side: side.label(),
        });
    }
    Ok(())
}

fn child_edge(connection: &Connection) -> Option<(&str, &str)> {
    match (&connection.from.module, &connection.to.module) {
        (Some(from), Some(to)) => Some((from.as_str(), to.as_str())),
        _ => None,
    }
}
