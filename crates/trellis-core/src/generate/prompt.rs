//! Prompt construction for generation and adjustment calls.
//!
//! Pure string assembly, no I/O. The schema reference mirrors
//! [`crate::draft`]'s bounds; keep the two in sync when limits change.

use crate::draft::{MAX_ACTIONS, MAX_DELIVERABLES, MAX_OUTCOMES};

/// JSON schema reference included in every prompt.
const SCHEMA_REFERENCE: &str = r#"## Plan JSON Schema

Respond with a single JSON object and nothing else:

```json
{
  "idea": "string",          // REQUIRED. Echo the idea back VERBATIM.
  "title": "string",         // REQUIRED. Short plan title.
  "summary": "string",       // REQUIRED. One-paragraph plan summary.
  "outcomes": [              // REQUIRED. 1-8 outcomes, in execution order.
    {
      "title": "string",
      "summary": "string",
      "status": "todo",      // "todo" | "doing" | "done"
      "deliverables": [      // 1-8 per outcome, in execution order.
        {
          "title": "string",
          "done_when": "string",   // One acceptance sentence.
          "notes": "string",       // Optional.
          "status": "todo",
          "actions": [             // 0-12 per deliverable.
            { "title": "string", "status": "todo" }
          ]
        }
      ]
    }
  ]
}
```
"#;

/// Decomposition guidance included in the generation prompt.
const DECOMPOSITION_GUIDELINES: &str = r#"## Decomposition Guidelines

1. **Outcomes are results, not activities.** Each outcome names a state of
   the world worth reaching on the way to the idea.
2. **Deliverables are checkable.** Every deliverable carries a `done_when`
   sentence a non-expert could verify.
3. **Actions are small.** A single sitting of work each; start titles with
   a verb.
4. **Order everything.** Arrays are stored in the order you emit them and
   shown to the user as the execution order.
5. **Stay inside the limits.** The schema bounds are enforced; an
   oversized plan is rejected wholesale.
"#;

/// Build the prompt for initial plan generation.
///
/// `research`, when present, is a JSON array of snippets gathered by the
/// research collaborator and is quoted for grounding.
pub fn build_generation_prompt(idea: &str, research: Option<&serde_json::Value>) -> String {
    let mut prompt = String::with_capacity(4096);

    prompt.push_str("# Plan Architect for Trellis\n\n");
    prompt.push_str(
        "You are a plan architect for Trellis. Turn the idea below into a \
         three-level execution hierarchy: outcomes, each with deliverables, \
         each with actions.\n\n",
    );
    prompt.push_str(&format!(
        "Limits: at most {MAX_OUTCOMES} outcomes, {MAX_DELIVERABLES} deliverables \
         per outcome, {MAX_ACTIONS} actions per deliverable.\n\n"
    ));

    prompt.push_str(SCHEMA_REFERENCE);
    prompt.push('\n');
    prompt.push_str(DECOMPOSITION_GUIDELINES);
    prompt.push('\n');

    prompt.push_str("## Idea\n\n");
    prompt.push_str(idea);
    prompt.push('\n');

    if let Some(research) = research {
        prompt.push_str("\n## Research Snippets\n\n");
        prompt.push_str(
            "Background gathered for this idea; use it to ground titles and \
             acceptance criteria.\n\n",
        );
        prompt.push_str(&research.to_string());
        prompt.push('\n');
    }

    prompt
}

/// Build the prompt for an adjustment round.
///
/// The model is asked to re-emit the complete structure (not a diff) and
/// to echo the original idea verbatim; the consistency guard rejects any
/// draft where the echo drifted.
pub fn build_adjustment_prompt(idea: &str, instruction: &str) -> String {
    let mut prompt = String::with_capacity(4096);

    prompt.push_str("# Plan Adjustment for Trellis\n\n");
    prompt.push_str(
        "Revise the plan we have been discussing in this conversation. \
         Re-emit the COMPLETE plan structure, not a diff: every outcome, \
         deliverable, and action you want to keep must appear in the \
         response. Preserve the status of nodes you are not changing.\n\n",
    );

    prompt.push_str(SCHEMA_REFERENCE);
    prompt.push('\n');

    prompt.push_str("## Original Idea (echo this back verbatim)\n\n");
    prompt.push_str(idea);
    prompt.push('\n');

    prompt.push_str("\n## Adjustment Request\n\n");
    prompt.push_str(instruction);
    prompt.push('\n');

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_prompt_contains_schema_markers() {
        let prompt = build_generation_prompt("open a bakery", None);
        assert!(prompt.contains("Plan JSON Schema"));
        assert!(prompt.contains("\"outcomes\""));
        assert!(prompt.contains("\"done_when\""));
        assert!(prompt.contains("\"actions\""));
    }

    #[test]
    fn generation_prompt_contains_guidelines_and_idea() {
        let prompt = build_generation_prompt("open a bakery", None);
        assert!(prompt.contains("Decomposition Guidelines"));
        assert!(prompt.contains("open a bakery"));
        assert!(!prompt.contains("Research Snippets"));
    }

    #[test]
    fn generation_prompt_embeds_limits() {
        let prompt = build_generation_prompt("idea", None);
        assert!(prompt.contains(&format!("at most {MAX_OUTCOMES} outcomes")));
    }

    #[test]
    fn generation_prompt_includes_research_when_present() {
        let research = serde_json::json!([{"source": "example.org", "text": "ovens are hot"}]);
        let prompt = build_generation_prompt("open a bakery", Some(&research));
        assert!(prompt.contains("Research Snippets"));
        assert!(prompt.contains("ovens are hot"));
    }

    #[test]
    fn adjustment_prompt_demands_full_reemission() {
        let prompt = build_adjustment_prompt("open a bakery", "add a marketing outcome");
        assert!(prompt.contains("COMPLETE plan structure"));
        assert!(prompt.contains("not a diff"));
        assert!(prompt.contains("echo this back verbatim"));
        assert!(prompt.contains("open a bakery"));
        assert!(prompt.contains("add a marketing outcome"));
    }
}
