//! RPC method table.
//!
//! Maps method names onto the configuration registry and the simulation
//! manager. Every served method answers with one string: its result rendered
//! as JSON with a 4-space indent. Failures inside a method, including wrong
//! parameter counts or types, become the error envelope instead of a fault.

use serde::Serialize;
use serde_json::{json, Map, Value as Json};

use tracing::{debug, warn};

use super::xmlrpc::{MethodCall, Value};
use crate::config::catalog;
use crate::config::{Cache, ConfigRegistry, ConfigurationData};
use crate::error::RpcError;
use crate::sim::SimulationManager;

/// State shared by every request: the registry and the manager.
pub struct Gema {
    pub registry: ConfigRegistry,
    pub manager: SimulationManager,
}

impl Gema {
    pub fn new(manager: SimulationManager) -> Self {
        Self {
            registry: ConfigRegistry::new(),
            manager,
        }
    }
}

/// The value to send back, and whether the server should stop afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub value: Value,
    pub shutdown: bool,
}

impl Reply {
    fn value(value: Value) -> Self {
        Self {
            value,
            shutdown: false,
        }
    }
}

struct Endpoint {
    name: &'static str,
    desc: &'static str,
    params: Option<&'static str>,
    details: &'static [(&'static str, &'static str)],
    returns: &'static str,
}

const ENDPOINTS: &[Endpoint] = &[
    Endpoint {
        name: "get_endpoints",
        desc: "Retrieve a comprehensive list of all available RPC endpoints and their descriptions",
        params: None,
        details: &[],
        returns: "dict: Dictionary of all endpoints with descriptions and parameters",
    },
    Endpoint {
        name: "get_config_options",
        desc: "Retrieve all available configuration options and their valid values from the simulator",
        params: None,
        details: &[],
        returns: "dict: Configuration options and their acceptable values",
    },
    Endpoint {
        name: "get_configs",
        desc: "Retrieve a list of all stored configurations in the system",
        params: None,
        details: &[],
        returns: "list[Configuration]: List of all configuration objects",
    },
    Endpoint {
        name: "get_sims",
        desc: "Retrieve a list of all stored simulations in the system",
        params: None,
        details: &[],
        returns: "list[Simulation]: List of all simulation objects",
    },
    Endpoint {
        name: "manage_sim",
        desc: "Control a running simulation by ID or process ID",
        params: Some("(id: int, cmd: str)"),
        details: &[
            ("id", "Simulation ID or process ID"),
            ("cmd", "Command to execute on the simulation (status, pause, resume, or kill)"),
        ],
        returns: "str: Result message of the management command",
    },
    Endpoint {
        name: "shutdown",
        desc: "Gracefully terminate the gEMA server with a 1-second delay to allow response transmission",
        params: None,
        details: &[],
        returns: "str: Confirmation message with process ID",
    },
    Endpoint {
        name: "add_config",
        desc: "Create a new configuration with specified ID and optional initialization data",
        params: Some("(config_id: int, d_data: Optional[dict])"),
        details: &[
            ("config_id", "Unique identifier for the configuration"),
            ("d_data", "Optional dictionary containing initial configuration data"),
        ],
        returns: "str: Success or failure message",
    },
    Endpoint {
        name: "set_board",
        desc: "Configure board parameters for a specific configuration",
        params: Some("(config_id: int, type: str, clk: float)"),
        details: &[
            ("config_id", "Configuration identifier"),
            ("type", "Board type identifier"),
            ("clk", "Clock frequency in GHz"),
        ],
        returns: "str: Configuration update status",
    },
    Endpoint {
        name: "set_processor",
        desc: "Set processor configuration parameters",
        params: Some("(config_id: int, isa: str, type: str, cpu: str, ncores: int)"),
        details: &[
            ("config_id", "Configuration identifier"),
            ("isa", "Instruction Set Architecture"),
            ("type", "Processor type"),
            ("cpu", "CPU model identifier"),
            ("ncores", "Number of CPU cores"),
        ],
        returns: "str: Configuration update status",
    },
    Endpoint {
        name: "set_memory",
        desc: "Configure memory system parameters",
        params: Some("(config_id: int, type: str, size: int)"),
        details: &[
            ("config_id", "Configuration identifier"),
            ("type", "Memory system type"),
            ("size", "Memory size in MB"),
        ],
        returns: "str: Configuration update status",
    },
    Endpoint {
        name: "set_cache",
        desc: "Configure cache hierarchy with customizable cache levels",
        params: Some(
            "(config_id: int, type: str, l1d_size: int, l1i_size: int, l2_size: Optional[int], \
             l1d_assoc: Optional[int], l1i_assoc: Optional[int], l2_assoc: Optional[int])",
        ),
        details: &[
            ("config_id", "Configuration identifier"),
            ("type", "Cache hierarchy type"),
            ("l1d_size", "L1 data cache size in KiB"),
            ("l1i_size", "L1 instruction cache size in KiB"),
            ("l2_size", "Optional L2 cache size in KiB"),
            ("l1d_assoc", "Optional L1 data cache associativity"),
            ("l1i_assoc", "Optional L1 instruction cache associativity"),
            ("l2_assoc", "Optional L2 cache associativity"),
        ],
        returns: "str: Configuration update status",
    },
    Endpoint {
        name: "set_resource",
        desc: "Set additional resource for a specific configuration",
        params: Some("(config_id: int, resource: str)"),
        details: &[
            ("config_id", "Configuration identifier"),
            ("resource", "Resource identifier"),
        ],
        returns: "str: Resource update status",
    },
    Endpoint {
        name: "run_simulation",
        desc: "Start a new simulation using the specified configuration",
        params: Some("(config_id: int)"),
        details: &[("config_id", "Identifier of the configuration to use")],
        returns: "str: Simulation start status message",
    },
    Endpoint {
        name: "get_config_by_id",
        desc: "Retrieve a specific configuration by its identifier",
        params: Some("(config_id: int)"),
        details: &[("config_id", "Identifier of the configuration to retrieve")],
        returns: "Union[Configuration, str]: Configuration object or error message",
    },
    Endpoint {
        name: "delete_config",
        desc: "Remove a specific configuration from the system",
        params: Some("(config_id: int)"),
        details: &[("config_id", "Identifier of the configuration to delete")],
        returns: "str: Deletion status message",
    },
];

const INTROSPECTION: &[&str] = &["system.listMethods", "system.methodHelp"];

/// Names of every method the gateway answers, sorted.
pub fn method_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = ENDPOINTS
        .iter()
        .map(|e| e.name)
        .chain(INTROSPECTION.iter().copied())
        .collect();
    names.sort_unstable();
    names
}

fn endpoint(name: &str) -> Option<&'static Endpoint> {
    ENDPOINTS.iter().find(|e| e.name == name)
}

fn describe_endpoints() -> Json {
    let mut table = Map::new();
    for e in ENDPOINTS {
        let mut entry = Map::new();
        entry.insert("desc".to_string(), json!(e.desc));
        entry.insert("params".to_string(), json!(e.params));
        if !e.details.is_empty() {
            let details: Map<String, Json> = e
                .details
                .iter()
                .map(|(k, v)| (k.to_string(), json!(v)))
                .collect();
            entry.insert("details".to_string(), Json::Object(details));
        }
        entry.insert("returns".to_string(), json!(e.returns));
        table.insert(e.name.to_string(), Json::Object(entry));
    }
    Json::Object(table)
}

/// Renders a value as JSON with a 4-space indent.
pub fn to_json_text<T: Serialize + ?Sized>(value: &T) -> Result<String, String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut serializer)
        .map_err(|e| e.to_string())?;
    String::from_utf8(buf).map_err(|e| e.to_string())
}

/// The envelope returned when a method fails internally.
pub fn error_envelope(details: &str) -> String {
    let envelope = json!({
        "status": "error",
        "message": "Internal server error",
        "details": details,
    });
    to_json_text(&envelope).unwrap_or_else(|_| envelope.to_string())
}

/// Handles one decoded call.
///
/// # Returns
///
/// The reply for served methods (successful or enveloped failures), or
/// `RpcError::UnknownMethod`, which the transport turns into a fault.
pub fn handle(gema: &mut Gema, call: &MethodCall) -> Result<Reply, RpcError> {
    match call.name.as_str() {
        "system.listMethods" => {
            let names = method_names()
                .into_iter()
                .map(|n| Value::Str(n.to_string()))
                .collect();
            Ok(Reply::value(Value::Array(names)))
        }
        "system.methodHelp" => {
            let params = Params::new("system.methodHelp", &call.params);
            params.arity(1, 1).map_err(RpcError::BadParams)?;
            let name = params.string(0, "method_name").map_err(RpcError::BadParams)?;
            let help = endpoint(name).map(|e| e.desc).unwrap_or_default();
            Ok(Reply::value(Value::Str(help.to_string())))
        }
        name if endpoint(name).is_some() => {
            let params = Params::new(name, &call.params);
            let text = match invoke(gema, name, &params) {
                Ok(text) => text,
                Err(details) => {
                    warn!(method = name, %details, "rpc method failed");
                    return Ok(Reply::value(Value::Str(error_envelope(&details))));
                }
            };
            debug!(method = name, "rpc method served");
            Ok(Reply {
                value: Value::Str(text),
                shutdown: name == "shutdown",
            })
        }
        other => Err(RpcError::UnknownMethod(other.to_string())),
    }
}

fn invoke(gema: &mut Gema, name: &str, p: &Params<'_>) -> Result<String, String> {
    let message = match name {
        "get_endpoints" => {
            p.arity(0, 0)?;
            return to_json_text(&describe_endpoints());
        }
        "get_config_options" => {
            p.arity(0, 0)?;
            return to_json_text(&catalog::discover_options());
        }
        "get_configs" => {
            p.arity(0, 0)?;
            return to_json_text(gema.registry.list());
        }
        "get_sims" => {
            p.arity(0, 0)?;
            return to_json_text(gema.manager.simulations());
        }
        "get_config_by_id" => {
            p.arity(1, 1)?;
            let id = p.int(0, "config_id")?;
            match gema.registry.get(id) {
                Some(config) => return to_json_text(config),
                None => format!("Config with ID {} does not exist.", id),
            }
        }
        "add_config" => {
            p.arity(1, 2)?;
            let id = p.int(0, "config_id")?;
            let data = match p.optional(1) {
                Some(value) => Some(
                    serde_json::from_value::<ConfigurationData>(value.to_json())
                        .map_err(|e| format!("invalid configuration data: {}", e))?,
                ),
                None => None,
            };
            if gema.registry.add(id, data) {
                format!("Config with ID {} has been successfully created.", id)
            } else {
                format!("Config with ID {} already exists.", id)
            }
        }
        "delete_config" => {
            p.arity(1, 1)?;
            let id = p.int(0, "config_id")?;
            if gema.registry.delete(id) {
                format!("Config with ID {} has been successfully deleted.", id)
            } else {
                format!("Config with ID {} does not exist.", id)
            }
        }
        "set_board" => {
            p.arity(3, 3)?;
            let id = p.int(0, "config_id")?;
            let ok = gema
                .registry
                .set_board(id, p.string(1, "type")?, p.float(2, "clk")?);
            updated(ok, id, "Board")
        }
        "set_processor" => {
            p.arity(5, 5)?;
            let id = p.int(0, "config_id")?;
            let ok = gema.registry.set_processor(
                id,
                p.string(1, "isa")?,
                p.string(2, "type")?,
                p.string(3, "cpu")?,
                p.int(4, "ncores")?,
            );
            updated(ok, id, "Processor")
        }
        "set_memory" => {
            p.arity(3, 3)?;
            let id = p.int(0, "config_id")?;
            let ok = gema
                .registry
                .set_memory(id, p.string(1, "type")?, p.int(2, "size")?);
            updated(ok, id, "Memory")
        }
        "set_cache" => {
            p.arity(4, 8)?;
            let id = p.int(0, "config_id")?;
            let cache = Cache {
                kind: Some(p.string(1, "type")?.to_string()),
                l1d_size: Some(p.int(2, "l1d_size")?),
                l1i_size: Some(p.int(3, "l1i_size")?),
                l2_size: p.optional_int(4, "l2_size")?,
                l1d_assoc: p.optional_int(5, "l1d_assoc")?,
                l1i_assoc: p.optional_int(6, "l1i_assoc")?,
                l2_assoc: p.optional_int(7, "l2_assoc")?,
            };
            updated(gema.registry.set_cache(id, cache), id, "Cache")
        }
        "set_resource" => {
            p.arity(2, 2)?;
            let id = p.int(0, "config_id")?;
            if gema.registry.set_resource(id, p.string(1, "resource")?) {
                format!("Resource updated for ID {} successfully.", id)
            } else {
                format!("Config with ID {} does not exist.", id)
            }
        }
        "run_simulation" => {
            p.arity(1, 1)?;
            let id = p.int(0, "config_id")?;
            if gema.registry.get(id).is_none() {
                format!("Config with ID {} does not exist.", id)
            } else {
                gema.manager
                    .launch(&gema.registry, id)
                    .map_err(|e| e.to_string())?;
                format!("Starting simulation using Config ID: {}", id)
            }
        }
        "manage_sim" => {
            p.arity(2, 2)?;
            let id = p.int(0, "id")?;
            gema.manager.manage(id, p.string(1, "cmd")?)
        }
        "shutdown" => {
            p.arity(0, 0)?;
            format!(
                "Terminating gEMA server process, pid: {}",
                std::process::id()
            )
        }
        other => return Err(format!("method \"{}\" is not supported", other)),
    };
    to_json_text(&message)
}

fn updated(ok: bool, id: i64, section: &str) -> String {
    if ok {
        format!("{} configuration updated for ID {} successfully.", section, id)
    } else {
        format!(
            "Config with ID {} does not exist, or given parameter is invalid.",
            id
        )
    }
}

/// Positional parameter access with descriptive type errors.
struct Params<'a> {
    method: &'a str,
    values: &'a [Value],
}

impl<'a> Params<'a> {
    fn new(method: &'a str, values: &'a [Value]) -> Self {
        Self { method, values }
    }

    fn arity(&self, min: usize, max: usize) -> Result<(), String> {
        let given = self.values.len();
        if given < min || given > max {
            let expected = if min == max {
                format!("{}", min)
            } else {
                format!("from {} to {}", min, max)
            };
            return Err(format!(
                "{}() takes {} positional arguments but {} were given",
                self.method, expected, given
            ));
        }
        Ok(())
    }

    fn get(&self, index: usize, name: &str) -> Result<&'a Value, String> {
        self.values
            .get(index)
            .ok_or_else(|| format!("{}() missing required argument: '{}'", self.method, name))
    }

    fn optional(&self, index: usize) -> Option<&'a Value> {
        match self.values.get(index) {
            None | Some(Value::Nil) => None,
            Some(value) => Some(value),
        }
    }

    fn int(&self, index: usize, name: &str) -> Result<i64, String> {
        match self.get(index, name)? {
            Value::Int(i) => Ok(*i),
            other => Err(self.type_error(name, "int", other)),
        }
    }

    fn optional_int(&self, index: usize, name: &str) -> Result<Option<i64>, String> {
        match self.optional(index) {
            None => Ok(None),
            Some(Value::Int(i)) => Ok(Some(*i)),
            Some(other) => Err(self.type_error(name, "int", other)),
        }
    }

    fn float(&self, index: usize, name: &str) -> Result<f64, String> {
        match self.get(index, name)? {
            Value::Double(d) => Ok(*d),
            Value::Int(i) => Ok(*i as f64),
            other => Err(self.type_error(name, "float", other)),
        }
    }

    fn string(&self, index: usize, name: &str) -> Result<&'a str, String> {
        match self.get(index, name)? {
            Value::Str(s) => Ok(s.as_str()),
            other => Err(self.type_error(name, "str", other)),
        }
    }

    fn type_error(&self, name: &str, expected: &str, found: &Value) -> String {
        format!(
            "{}() argument '{}' must be {}, not {}",
            self.method,
            name,
            expected,
            found.type_name()
        )
    }
}
