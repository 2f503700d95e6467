use serde_json::Value;

use crate::core::CheckStatus;
use crate::dispatch::Operation;

/// One compliance check. The engine runs its operation on every target and
/// turns the records `inspect` flags into results.
pub trait Check {
    fn id(&self) -> &str;
    fn section_id(&self) -> &str;
    fn section_title(&self) -> &str;
    fn title(&self) -> &str;
    fn permissions(&self) -> &[&str];
    fn operation(&self) -> Operation;
    /// One line describing a non-compliant resource, or `None` when it complies.
    fn inspect(&self, record: &Value) -> Option<String>;
    fn severity(&self) -> CheckStatus {
        CheckStatus::Fail
    }
    fn recommendation(&self) -> &str {
        ""
    }
}

pub struct BuiltinCheck {
    pub id: &'static str,
    pub section_id: &'static str,
    pub section_title: &'static str,
    pub title: &'static str,
    pub permissions: &'static [&'static str],
    pub args: &'static [&'static str],
    pub severity: CheckStatus,
    pub recommendation: &'static str,
    pub inspect: fn(&Value) -> Option<String>,
}

impl Check for BuiltinCheck {
    fn id(&self) -> &str {
        self.id
    }

    fn section_id(&self) -> &str {
        self.section_id
    }

    fn section_title(&self) -> &str {
        self.section_title
    }

    fn title(&self) -> &str {
        self.title
    }

    fn permissions(&self) -> &[&str] {
        self.permissions
    }

    fn operation(&self) -> Operation {
        Operation::new(self.args).structured()
    }

    fn inspect(&self, record: &Value) -> Option<String> {
        (self.inspect)(record)
    }

    fn severity(&self) -> CheckStatus {
        self.severity
    }

    fn recommendation(&self) -> &str {
        self.recommendation
    }
}

const NSC_CONFIGURED: (&str, &str) = (
    "1.2",
    "Network security controls are configured and maintained",
);
const CDE_ACCESS: (&str, &str) = (
    "1.3",
    "Network access to and from the cardholder data environment is restricted",
);
const TRUST_BOUNDARY: (&str, &str) = (
    "1.4",
    "Network connections between trusted and untrusted networks are controlled",
);

pub fn builtin_checks() -> Vec<BuiltinCheck> {
    vec![
        BuiltinCheck {
            id: "1.2.1-default-network",
            section_id: NSC_CONFIGURED.0,
            section_title: NSC_CONFIGURED.1,
            title: "Auto-created default network is not in use",
            permissions: &["compute.networks.list"],
            args: &["compute", "networks", "list"],
            severity: CheckStatus::Warn,
            recommendation: "Delete the default network and create custom-mode VPCs with explicit firewall rules.",
            inspect: default_network,
        },
        BuiltinCheck {
            id: "1.2.7-subnet-flow-logs",
            section_id: NSC_CONFIGURED.0,
            section_title: NSC_CONFIGURED.1,
            title: "VPC flow logs are enabled on every subnet",
            permissions: &["compute.subnetworks.list"],
            args: &["compute", "networks", "subnets", "list"],
            severity: CheckStatus::Warn,
            recommendation: "Enable flow logs on each subnet so network security control activity can be reviewed.",
            inspect: subnet_without_flow_logs,
        },
        BuiltinCheck {
            id: "1.3.1-open-ingress",
            section_id: CDE_ACCESS.0,
            section_title: CDE_ACCESS.1,
            title: "No firewall rule allows ingress from 0.0.0.0/0",
            permissions: &["compute.firewalls.list"],
            args: &["compute", "firewall-rules", "list"],
            severity: CheckStatus::Fail,
            recommendation: "Restrict sourceRanges to known networks, or disable the rule.",
            inspect: open_ingress_rule,
        },
        BuiltinCheck {
            id: "1.4.1-public-instance-ip",
            section_id: TRUST_BOUNDARY.0,
            section_title: TRUST_BOUNDARY.1,
            title: "VM instances have no external IP address",
            permissions: &["compute.instances.list"],
            args: &["compute", "instances", "list"],
            severity: CheckStatus::Fail,
            recommendation: "Remove external access configs and reach instances through Cloud NAT, IAP or a load balancer.",
            inspect: instance_with_external_ip,
        },
        BuiltinCheck {
            id: "1.4.2-sql-open-network",
            section_id: TRUST_BOUNDARY.0,
            section_title: TRUST_BOUNDARY.1,
            title: "Cloud SQL instances do not authorize 0.0.0.0/0",
            permissions: &["cloudsql.instances.list"],
            args: &["sql", "instances", "list"],
            severity: CheckStatus::Fail,
            recommendation: "Remove 0.0.0.0/0 from authorized networks and prefer private IP connectivity.",
            inspect: sql_open_to_world,
        },
    ]
}

/// Built-in checks narrowed to `ids`; an empty filter keeps all of them.
pub fn select_checks(ids: &[String]) -> Result<Vec<BuiltinCheck>, String> {
    let all = builtin_checks();
    if ids.is_empty() {
        return Ok(all);
    }
    if let Some(unknown) = ids.iter().find(|id| !all.iter().any(|c| c.id == id.as_str())) {
        return Err(format!("unknown check id: {unknown}"));
    }
    Ok(all
        .into_iter()
        .filter(|c| ids.iter().any(|id| id == c.id))
        .collect())
}

fn str_field<'a>(record: &'a Value, pointer: &str) -> Option<&'a str> {
    record.pointer(pointer).and_then(Value::as_str)
}

fn name_of(record: &Value) -> &str {
    str_field(record, "/name").unwrap_or("<unnamed>")
}

/// Last path segment of a self-link style URL.
fn short_name(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

const ANY_IPV4: &str = "0.0.0.0/0";

fn default_network(record: &Value) -> Option<String> {
    (name_of(record) == "default").then(|| "network default exists".to_string())
}

fn subnet_without_flow_logs(record: &Value) -> Option<String> {
    let enabled = record
        .pointer("/enableFlowLogs")
        .or_else(|| record.pointer("/logConfig/enable"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if enabled {
        return None;
    }
    let region = str_field(record, "/region").map(short_name).unwrap_or("?");
    Some(format!("subnet {} ({region}) has flow logs disabled", name_of(record)))
}

fn open_ingress_rule(record: &Value) -> Option<String> {
    let direction = str_field(record, "/direction").unwrap_or("INGRESS");
    let disabled = record
        .pointer("/disabled")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !direction.eq_ignore_ascii_case("INGRESS") || disabled {
        return None;
    }
    let open = record
        .pointer("/sourceRanges")
        .and_then(Value::as_array)
        .is_some_and(|ranges| ranges.iter().any(|r| r.as_str() == Some(ANY_IPV4)));
    if !open {
        return None;
    }

    let mut allowed = Vec::new();
    for rule in record
        .pointer("/allowed")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let proto = str_field(rule, "/IPProtocol").unwrap_or("?");
        let ports: Vec<&str> = rule
            .pointer("/ports")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .collect();
        if ports.is_empty() {
            allowed.push(proto.to_string());
        } else {
            allowed.push(format!("{proto}:{}", ports.join(",")));
        }
    }
    let network = str_field(record, "/network").map(short_name).unwrap_or("?");
    let allowed = if allowed.is_empty() {
        "all".to_string()
    } else {
        allowed.join(" ")
    };
    Some(format!(
        "firewall rule {} on network {network} allows {allowed} from {ANY_IPV4}",
        name_of(record)
    ))
}

fn instance_with_external_ip(record: &Value) -> Option<String> {
    let ips: Vec<&str> = record
        .pointer("/networkInterfaces")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .flat_map(|nic| {
            nic.pointer("/accessConfigs")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
        })
        .filter_map(|ac| str_field(ac, "/natIP"))
        .collect();
    if ips.is_empty() {
        return None;
    }
    let zone = str_field(record, "/zone").map(short_name).unwrap_or("?");
    Some(format!(
        "instance {} ({zone}) has external IP {}",
        name_of(record),
        ips.join(",")
    ))
}

fn sql_open_to_world(record: &Value) -> Option<String> {
    let open = record
        .pointer("/settings/ipConfiguration/authorizedNetworks")
        .and_then(Value::as_array)
        .is_some_and(|nets| nets.iter().any(|n| str_field(n, "/value") == Some(ANY_IPV4)));
    open.then(|| format!("Cloud SQL instance {} authorizes {ANY_IPV4}", name_of(record)))
}
