use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};
use trafficlight_protocol::client::GeoRecord;
use trafficlight_protocol::request::RequestContext;

use crate::error::ToolError;
use crate::geo::GeoLocator;

/// Closed catalog of predicate tools.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Ip,
    BotsAppleIp,
    NotBotsAppleIp,
    Eq,
    NotEq,
    /// Name not in the catalog; always undecided.
    Unknown(String),
}

impl ToolKind {
    pub fn parse(name: &str) -> Self {
        match name {
            "IP" => ToolKind::Ip,
            "BOTS_APPLE_IP" => ToolKind::BotsAppleIp,
            "NOT_BOTS_APPLE_IP" => ToolKind::NotBotsAppleIp,
            "EQ" => ToolKind::Eq,
            "NOT_EQ" => ToolKind::NotEq,
            other => ToolKind::Unknown(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ToolKind::Ip => "IP",
            ToolKind::BotsAppleIp => "BOTS_APPLE_IP",
            ToolKind::NotBotsAppleIp => "NOT_BOTS_APPLE_IP",
            ToolKind::Eq => "EQ",
            ToolKind::NotEq => "NOT_EQ",
            ToolKind::Unknown(name) => name,
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Three-valued predicate result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolOutcome {
    Pass,
    Fail,
    Undecided,
}

impl ToolOutcome {
    pub fn is_pass(self) -> bool {
        matches!(self, ToolOutcome::Pass)
    }
}

impl From<bool> for ToolOutcome {
    fn from(value: bool) -> Self {
        if value {
            ToolOutcome::Pass
        } else {
            ToolOutcome::Fail
        }
    }
}

/// Evaluates predicate tools against a request.
#[derive(Clone)]
pub struct PredicateRegistry {
    geo: Arc<dyn GeoLocator>,
    allow_insufficient_ip: bool,
}

impl PredicateRegistry {
    pub fn new(geo: Arc<dyn GeoLocator>, allow_insufficient_ip: bool) -> Self {
        Self {
            geo,
            allow_insufficient_ip,
        }
    }

    pub fn geo(&self) -> &Arc<dyn GeoLocator> {
        &self.geo
    }

    /// Runs one tool. Errors inside a predicate are logged and reported as undecided.
    pub async fn evaluate(&self, kind: &ToolKind, args: &Value, ctx: &RequestContext) -> ToolOutcome {
        let result = match kind {
            ToolKind::Ip => self.ip(args, ctx),
            ToolKind::BotsAppleIp => self.apple_bot(ctx),
            ToolKind::NotBotsAppleIp => self.apple_bot(ctx).map(negate),
            ToolKind::Eq => Ok(eq(args).into()),
            ToolKind::NotEq => Ok((!eq(args)).into()),
            ToolKind::Unknown(name) => {
                debug!(tool = %name, "unknown tool, treating as undecided");
                Ok(ToolOutcome::Undecided)
            }
        };

        result.unwrap_or_else(|err| {
            warn!(tool = %kind, error = %err, "tool evaluation failed");
            ToolOutcome::Undecided
        })
    }

    fn ip(&self, args: &Value, ctx: &RequestContext) -> Result<ToolOutcome, ToolError> {
        let Some(raw_ip) = ctx.client_ip.as_deref() else {
            return Ok(self.allow_insufficient_ip.into());
        };
        let Some(record) = self.locate(raw_ip)? else {
            return Ok(ToolOutcome::Fail);
        };

        let outcome = match args.get("country") {
            None | Some(Value::Null) => true,
            Some(Value::String(country)) => record.country_code() == Some(country.as_str()),
            Some(Value::Array(countries)) => record
                .country_code()
                .map(|code| countries.iter().any(|c| c.as_str() == Some(code)))
                .unwrap_or(false),
            Some(_) => false,
        };
        Ok(outcome.into())
    }

    fn apple_bot(&self, ctx: &RequestContext) -> Result<ToolOutcome, ToolError> {
        let Some(raw_ip) = ctx.client_ip.as_deref() else {
            return Ok(ToolOutcome::Undecided);
        };
        Ok(match self.locate(raw_ip)? {
            Some(record) => record.is_apple_network().into(),
            None => ToolOutcome::Undecided,
        })
    }

    fn locate(&self, raw_ip: &str) -> Result<Option<GeoRecord>, ToolError> {
        let ip: IpAddr = raw_ip
            .trim()
            .parse()
            .map_err(|_| ToolError::InvalidIp(raw_ip.to_string()))?;
        Ok(self.geo.lookup(ip)?)
    }
}

fn negate(outcome: ToolOutcome) -> ToolOutcome {
    match outcome {
        ToolOutcome::Pass => ToolOutcome::Fail,
        ToolOutcome::Fail => ToolOutcome::Pass,
        ToolOutcome::Undecided => ToolOutcome::Undecided,
    }
}

fn eq(args: &Value) -> bool {
    let left = args.get("value1").unwrap_or(&Value::Null);
    let right = args.get("value2").unwrap_or(&Value::Null);
    values_equal(left, right)
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(lhs), Value::Number(rhs)) => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(l), Some(r)) => l == r,
            _ => lhs == rhs,
        },
        _ => left == right,
    }
}
