//! Renders the workflow's phase graph.

use super::state::FlowPhase;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Output format for [`render`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlotFormat {
    /// Mermaid `stateDiagram-v2` source.
    #[default]
    Mermaid,
    /// One transition per line.
    Text,
}

impl std::str::FromStr for PlotFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mermaid" => Ok(Self::Mermaid),
            "text" => Ok(Self::Text),
            other => Err(format!("unknown plot format '{}' (expected mermaid or text)", other)),
        }
    }
}

/// An edge in the phase graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: FlowPhase,
    pub to: FlowPhase,
    pub label: &'static str,
}

/// Every transition the driver can take, in the order it takes them.
pub const TRANSITIONS: [Transition; 4] = [
    Transition {
        from: FlowPhase::Generating,
        to: FlowPhase::Reviewing,
        label: "artifact",
    },
    Transition {
        from: FlowPhase::Reviewing,
        to: FlowPhase::Generating,
        label: "CONTINUE",
    },
    Transition {
        from: FlowPhase::Reviewing,
        to: FlowPhase::Accepted,
        label: "ACCEPT",
    },
    Transition {
        from: FlowPhase::Reviewing,
        to: FlowPhase::Aborted,
        label: "ABORT",
    },
];

/// Render the phase graph.
pub fn render(format: PlotFormat) -> String {
    match format {
        PlotFormat::Mermaid => render_mermaid(),
        PlotFormat::Text => render_text(),
    }
}

fn render_mermaid() -> String {
    let mut out = String::from("stateDiagram-v2\n");
    let _ = writeln!(out, "    [*] --> {}", FlowPhase::Generating);
    for t in TRANSITIONS {
        let _ = writeln!(out, "    {} --> {}: {}", t.from, t.to, t.label);
    }
    for phase in FlowPhase::ALL.iter().filter(|p| p.is_terminal()) {
        let _ = writeln!(out, "    {} --> [*]", phase);
    }
    out
}

fn render_text() -> String {
    let mut out = String::new();
    let _ = writeln!(out, "start -> {}", FlowPhase::Generating);
    for t in TRANSITIONS {
        let _ = writeln!(out, "{} -> {} [{}]", t.from, t.to, t.label);
    }
    out
}
