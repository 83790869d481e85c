//! Built-in agent definitions for the five SLR stages.

use agentflow_common::AgentConfig;

/// Prompt stored by early releases before real stage prompts shipped.
/// Agents still carrying it are upgraded on open.
pub const PLACEHOLDER_PROMPT: &str = "Internal system prompt handled by SLR Pipeline.";

const SCREENER_PROMPT: &str = "\
You screen academic articles for a systematic literature review on corporate governance (CG) \
mechanisms and ESG/CSR outcomes.

Decide one status from the title, keywords and abstract:
- Include: at least one CG mechanism is an explanatory variable and an ESG/CSR outcome is studied.
- Maybe: both appear but their roles are unclear from the abstract.
- Exclude: out of scope; give an exclusion_code.
- Background: review, conceptual or methodological paper relevant to the framing.

Respond with a single JSON object only:
{\"status\": \"Include|Maybe|Exclude|Background\", \"exclusion_code\": null, \"reason\": \"...\"}";

const PATH_PROMPT: &str = "\
Classify the causal path studied by the article.
- A: CG mechanisms -> ESG/CSR disclosure or performance
- B: ESG/CSR -> firm performance, with CG as moderator or mediator
- Both, or Unclear

Respond with a single JSON object only:
{\"path\": \"A|B|Both|Unclear\", \"evidence\": \"...\"}";

const CG_PROMPT: &str = "\
List every corporate governance mechanism the article treats as an independent, moderating or \
mediating variable (board structure, board diversity, leadership, committees, ownership).

Respond with a single JSON object only:
{\"cg_mechanisms\": [\"...\"], \"primary\": \"...\"}";

const ESG_PROMPT: &str = "\
Tag the ESG/CSR outcome measures used by the article: disclosure, performance or rating, and \
which pillars (E, S, G) are covered.

Respond with a single JSON object only:
{\"esg_type\": \"disclosure|performance|rating|mixed\", \"pillars\": [\"E\", \"S\", \"G\"], \"measure\": \"...\"}";

const META_PROMPT: &str = "\
Extract study metadata and score relevance for the review from 1 (marginal) to 5 (core).

Respond with a single JSON object only:
{\"country\": \"...\", \"sample_period\": \"...\", \"method\": \"...\", \"relevance\": 1}";

/// Default agents in stage order.
pub fn default_agents() -> Vec<AgentConfig> {
    [
        ("slr-screener", "SLR Screener", "Title/abstract screener", SCREENER_PROMPT, 1),
        ("slr-path-classifier", "SLR Path Classifier", "Research path classifier", PATH_PROMPT, 2),
        ("slr-cg-tagger", "SLR CG Tagger", "Corporate governance mechanism tagger", CG_PROMPT, 3),
        ("slr-esg-tagger", "SLR ESG Tagger", "ESG outcome tagger", ESG_PROMPT, 4),
        ("slr-meta-scorer", "SLR Meta Scorer", "Study metadata extractor and relevance scorer", META_PROMPT, 5),
    ]
    .into_iter()
    .map(|(id, name, role, prompt, step)| {
        let mut agent = AgentConfig::new(id, role, prompt).with_model("sonnet");
        agent.name = name.to_string();
        agent.extra.insert("_slrStep".to_string(), serde_json::json!(step));
        agent
    })
    .collect()
}
