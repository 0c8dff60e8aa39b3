//! Structured iptables rules.
//!
//! A [`RuleSpec`] has exactly one rendering. That rendering is both the
//! argument vector handed to iptables and, joined with single spaces, the
//! body that identifies the rule in the ledger. Parsing a body recovers the
//! structure, so rules read back from the ledger are split into arguments
//! the same way they were when installed.

use std::{fmt, str::FromStr};

/// A rule body or one of its tokens was not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot parse rule {0:?}")]
pub struct ParseRuleError(pub String);

/// Kernel hook chains that traffic is diverted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseChain {
    /// `INPUT`
    Input,
    /// `OUTPUT`
    Output,
    /// `FORWARD`
    Forward,
}

impl BaseChain {
    /// Kernel name of the chain.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "INPUT",
            Self::Output => "OUTPUT",
            Self::Forward => "FORWARD",
        }
    }
}

impl fmt::Display for BaseChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BaseChain {
    type Err = ParseRuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INPUT" => Ok(Self::Input),
            "OUTPUT" => Ok(Self::Output),
            "FORWARD" => Ok(Self::Forward),
            other => Err(ParseRuleError(other.to_owned())),
        }
    }
}

/// Which side of the interface a chain binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// `-i`, packets entering through the interface.
    Ingress,
    /// `-o`, packets leaving through the interface.
    Egress,
}

impl Direction {
    /// The iptables interface flag.
    pub const fn flag(&self) -> &'static str {
        match self {
            Self::Ingress => "-i",
            Self::Egress => "-o",
        }
    }

    fn from_flag(flag: &str) -> Option<Self> {
        match flag {
            "-i" => Some(Self::Ingress),
            "-o" => Some(Self::Egress),
            _ => None,
        }
    }
}

/// Verdict of a default rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// `DROP`
    Drop,
    /// `ACCEPT`
    Accept,
}

impl Target {
    /// Kernel name of the target.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Drop => "DROP",
            Self::Accept => "ACCEPT",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Target {
    type Err = ParseRuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DROP" => Ok(Self::Drop),
            "ACCEPT" => Ok(Self::Accept),
            other => Err(ParseRuleError(other.to_owned())),
        }
    }
}

/// Where a rule should end up in its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placement {
    /// Inserted at the head of the chain if missing.
    First,
    /// Appended to the chain if missing.
    Last,
    /// Deleted from the chain if present.
    Absent,
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::First => "ensure first",
            Self::Last => "ensure last",
            Self::Absent => "ensure absent",
        })
    }
}

/// A single filter rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuleSpec {
    /// `<base> -<i|o> <interface> -j <chain>`
    Divert {
        /// Chain the jump lives in.
        base: BaseChain,
        /// Interface side matched.
        direction: Direction,
        /// Interface name.
        interface: String,
        /// Jump target.
        chain: String,
    },
    /// `<chain> -j <DROP|ACCEPT>`
    Default {
        /// Chain the rule closes.
        chain: String,
        /// Verdict.
        target: Target,
    },
    /// `<chain> -m u32 --u32 <expression> -j ACCEPT`
    U32 {
        /// Chain the rule lives in.
        chain: String,
        /// Rendered [`FilterExpression`](romana_net::FilterExpression), passed
        /// as one argument.
        expression: String,
    },
    /// `<chain> <args...>`, any other rule attached to a chain.
    Match {
        /// Chain the rule lives in.
        chain: String,
        /// Arguments after the chain name.
        args: Vec<String>,
    },
}

const U32_INFIX: &str = " -m u32 --u32 ";
const U32_SUFFIX: &str = " -j ACCEPT";

impl RuleSpec {
    /// A rule for `chain` built from whitespace separated match arguments.
    pub fn matching(chain: impl Into<String>, args: &str) -> Self {
        Self::Match {
            chain: chain.into(),
            args: args.split_whitespace().map(str::to_owned).collect(),
        }
    }

    /// The chain the rule lives in.
    pub fn chain(&self) -> &str {
        match self {
            Self::Divert { base, .. } => base.as_str(),
            Self::Default { chain, .. }
            | Self::U32 { chain, .. }
            | Self::Match { chain, .. } => chain,
        }
    }

    /// The rule rendered as iptables arguments, without the command flag.
    pub fn args(&self) -> Vec<String> {
        match self {
            Self::Divert { base, direction, interface, chain } => vec![
                base.to_string(),
                direction.flag().to_owned(),
                interface.clone(),
                "-j".to_owned(),
                chain.clone(),
            ],
            Self::Default { chain, target } => {
                vec![chain.clone(), "-j".to_owned(), target.to_string()]
            }
            Self::U32 { chain, expression } => vec![
                chain.clone(),
                "-m".to_owned(),
                "u32".to_owned(),
                "--u32".to_owned(),
                expression.clone(),
                "-j".to_owned(),
                Target::Accept.to_string(),
            ],
            Self::Match { chain, args } => {
                let mut out = Vec::with_capacity(args.len() + 1);
                out.push(chain.clone());
                out.extend(args.iter().cloned());
                out
            }
        }
    }

    /// The canonical body, which identifies the rule.
    pub fn body(&self) -> String {
        self.args().join(" ")
    }
}

impl fmt::Display for RuleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.body())
    }
}

impl FromStr for RuleSpec {
    type Err = ParseRuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s.trim();

        // The u32 expression contains spaces, so it has to be cut out before
        // splitting the rest.
        if let Some((chain, rest)) = body.split_once(U32_INFIX) {
            if let Some(expression) = rest.strip_suffix(U32_SUFFIX) {
                let chain = chain.trim();
                if !chain.is_empty() && !chain.contains(char::is_whitespace) {
                    return Ok(Self::U32 {
                        chain: chain.to_owned(),
                        expression: expression.trim().to_owned(),
                    });
                }
            }
        }

        let tokens: Vec<&str> = body.split_whitespace().collect();
        match tokens.as_slice() {
            [] => Err(ParseRuleError(s.to_owned())),
            [base, flag, interface, "-j", chain] => {
                match (base.parse::<BaseChain>(), Direction::from_flag(flag)) {
                    (Ok(base), Some(direction)) => Ok(Self::Divert {
                        base,
                        direction,
                        interface: (*interface).to_owned(),
                        chain: (*chain).to_owned(),
                    }),
                    _ => Ok(Self::matching(tokens[0], &tokens[1..].join(" "))),
                }
            }
            [chain, "-j", target] if target.parse::<Target>().is_ok() => Ok(Self::Default {
                chain: (*chain).to_owned(),
                target: target.parse()?,
            }),
            [chain, rest @ ..] => Ok(Self::Match {
                chain: (*chain).to_owned(),
                args: rest.iter().map(|arg| (*arg).to_owned()).collect(),
            }),
        }
    }
}
