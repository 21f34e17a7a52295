//! Loads per-agent system prompt templates and substitutes variables.
//!
//! Template bodies are opaque data as far as this crate is concerned: the
//! store only cares about the `{{variable}}` placeholders inside them. Real
//! deployments would load these from a content-addressed object store or a
//! config-managed directory; we embed a fixed default per agent and validate
//! it at construction time, which keeps the store dependency-free and gives
//! the fail-fast behavior described below without any I/O on the hot path.

use caseforge_domain::AgentName;

use crate::AiError;

/// The only variable names a template may reference. Anything else is a
/// startup error.
pub const ALLOWED_VARIABLES: &[&str] = &["business_type", "depth", "depth_description", "industry"];

/// Variables available for substitution into one agent's template.
///
/// `industry` is optional; templates that reference it when the caller
/// didn't supply one get an empty string.
#[derive(Debug, Clone, Default)]
pub struct TemplateVariables {
    /// The business type, e.g. `"saas"`.
    pub business_type: String,
    /// The requested depth, e.g. `"standard"`.
    pub depth: String,
    /// A human-readable description of the depth.
    pub depth_description: String,
    /// Free-text industry hint, if the caller provided one.
    pub industry: Option<String>,
}

impl TemplateVariables {
    fn lookup(&self, name: &str) -> Option<&str> {
        match name {
            "business_type" => Some(&self.business_type),
            "depth" => Some(&self.depth),
            "depth_description" => Some(&self.depth_description),
            "industry" => Some(self.industry.as_deref().unwrap_or("")),
            _ => None,
        }
    }
}

fn raw_template(agent: AgentName) -> &'static str {
    match agent {
        AgentName::Analyst => {
            "You are the analyst agent for a {{business_type}} business. Perform {{depth_description}} \
             and list the hypotheses worth investigating. Depth setting: {{depth}}. Industry: {{industry}}."
        }
        AgentName::Commercial => {
            "You are the commercial strategy agent for a {{business_type}} business. Given the analyst's \
             hypotheses, propose concrete commercial moves. Depth setting: {{depth}}."
        }
        AgentName::Market => {
            "You are the market research agent for a {{business_type}} business in the {{industry}} \
             industry. Surface relevant benchmarks and trends. Depth setting: {{depth}}."
        }
        AgentName::Financial => {
            "You are the financial viability agent for a {{business_type}} business. Evaluate the \
             commercial proposals for ROI and risk. Depth setting: {{depth}}."
        }
        AgentName::Reviewer => {
            "You are the executive reviewer for a {{business_type}} business. Consolidate the analyst, \
             commercial, market, and financial findings into one executive report. Depth: {{depth}} \
             ({{depth_description}})."
        }
    }
}

/// Finds every `{{name}}` placeholder in a template body.
fn placeholders(template: &str) -> impl Iterator<Item = &str> {
    let mut rest = template;
    std::iter::from_fn(move || loop {
        let start = rest.find("{{")?;
        let after_open = &rest[start + 2..];
        let end = after_open.find("}}")?;
        let name = after_open[..end].trim();
        rest = &after_open[end + 2..];
        if !name.is_empty() {
            return Some(name);
        }
    })
}

fn render_template(template: &str, variables: &TemplateVariables) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            out.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let name = after_open[..end].trim();
        out.push_str(variables.lookup(name).unwrap_or_default());
        rest = &after_open[end + 2..];
    }
    out.push_str(rest);
    out
}

/// Holds the five agent templates, validated once at construction.
///
/// A template is cached after first read; here that's trivial since every
/// template is a `&'static str` baked into the binary.
pub struct TemplateStore;

impl TemplateStore {
    /// Validates every agent's template against [`ALLOWED_VARIABLES`].
    ///
    /// Call this once at process startup; an `Err` means the binary should
    /// refuse to start rather than fail mid-request.
    pub fn validate() -> Result<Self, AiError> {
        for agent in AgentName::ALL {
            for name in placeholders(raw_template(agent)) {
                if !ALLOWED_VARIABLES.contains(&name) {
                    return Err(AiError::UnknownTemplateVariable {
                        agent,
                        variable: name.to_string(),
                    });
                }
            }
        }
        Ok(Self)
    }

    /// Renders `agent`'s system prompt, substituting `variables`.
    ///
    /// Unused provided variables are silently ignored, matching spec
    /// behavior; unknown template variables were already rejected in
    /// [`Self::validate`].
    #[must_use]
    pub fn render(&self, agent: AgentName, variables: &TemplateVariables) -> String {
        render_template(raw_template(agent), variables)
    }
}

/// Convenience constructor bundling a full variable set from analysis
/// fields, so callers don't hand-assemble a [`HashMap`] per call.
#[must_use]
pub fn variables_for(
    business_type: caseforge_domain::BusinessType,
    depth: caseforge_domain::Depth,
    industry: Option<String>,
) -> TemplateVariables {
    TemplateVariables {
        business_type: business_type.to_string(),
        depth: depth.to_string(),
        depth_description: depth.description().to_string(),
        industry,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caseforge_domain::{BusinessType, Depth};

    #[test]
    fn every_agent_template_validates() {
        assert!(TemplateStore::validate().is_ok());
    }

    #[test]
    fn render_substitutes_known_variables() {
        let store = TemplateStore::validate().unwrap();
        let vars = variables_for(BusinessType::Saas, Depth::Standard, None);
        let rendered = store.render(AgentName::Analyst, &vars);
        assert!(rendered.contains("saas"));
        assert!(rendered.contains("standard"));
        assert!(!rendered.contains("{{"));
    }

    #[test]
    fn missing_industry_renders_empty_string() {
        let store = TemplateStore::validate().unwrap();
        let vars = variables_for(BusinessType::Retail, Depth::Fast, None);
        let rendered = store.render(AgentName::Analyst, &vars);
        assert!(rendered.contains("Industry: ."));
    }

    #[test]
    fn unknown_variable_is_rejected_at_validate_time() {
        let bad = "hello {{nonsense}}";
        let found: Vec<&str> = placeholders(bad).collect();
        assert_eq!(found, vec!["nonsense"]);
        assert!(!ALLOWED_VARIABLES.contains(&"nonsense"));
    }

    #[test]
    fn unused_provided_variable_is_ignored() {
        let store = TemplateStore::validate().unwrap();
        let vars = variables_for(BusinessType::Finance, Depth::Deep, Some("fintech".to_string()));
        // Commercial's template never references {{industry}}; this should
        // not error or leave a placeholder behind.
        let rendered = store.render(AgentName::Commercial, &vars);
        assert!(!rendered.contains("{{"));
    }
}
