//! Prompts sent to the LLM providers.
//!
//! Both provider clients build their requests from the constants and helpers
//! here, so the wording stays identical no matter which provider the process
//! was configured with. Unit tests inspect the prompts directly.

/// System instruction for the narrative stage.
///
/// Asks for an explanatory text whose every sentence maps onto a
/// node-link-node triple, using linking phrases from six relationship classes.
pub const NARRATIVE_SYSTEM_PROMPT: &str = "You are an expert educational content generator. \
Your task is to write a comprehensive, well-structured explanatory text that connects and explains \
a list of given concepts in a way that is ideal for generating a concept map. The output must: \
Define and explain each concept clearly. Explicitly describe the relationships between concepts. \
Use varied and specific linking phrases to represent different types of relationships, such as: \
Hierarchical: is a type of, is part of, belongs to. \
Causal: leads to, causes, results in, is triggered by. \
Functional: is used for, enables, facilitates, supports. \
Associative: is related to, correlates with, interacts with. \
Definitional: is defined as, refers to, means. \
Comparative: is similar to, differs from, contrasts with. \
Organize the text in a logical flow, either hierarchical, causal, or thematic depending on the topic. \
Ensure each sentence can be translated into a node-link-node format for concept map generation.";

/// System message used by chat-style providers for the graph stage.
pub const GRAPH_SYSTEM_PROMPT: &str = "You are a JSON generator that only outputs valid JSON.";

/// Maximum number of times one relationship phrase may appear in a graph.
pub const MAX_PHRASE_REPEATS: usize = 4;

const GRAPH_SHAPE: &str = r#"You are an AI assistant that outputs JSON for a concept graph.
Your task is to generate a valid JSON object that contains only two keys: "nodes" and "links".
Each node must have: id (string), name (string), group (number).
Each link must have: source (string), target (string), type (string), and description (string)."#;

const GRAPH_OUTPUT_RULE: &str =
    "Return ONLY valid JSON — no explanations, no markdown, no extra text.";

/// Build the user message for the narrative stage.
pub fn narrative_user_message(text: &str) -> String {
    format!("{text}. \n\n Make sure it is not too long for an API request")
}

/// Build the graph-stage prompt.
///
/// With `diverse_links` the prompt also demands specific, non-repeating link
/// descriptions (no phrase more than [`MAX_PHRASE_REPEATS`] times).
pub fn graph_prompt(text: &str, diverse_links: bool) -> String {
    let mut prompt = String::with_capacity(GRAPH_SHAPE.len() + text.len() + 512);
    prompt.push_str(GRAPH_SHAPE);
    prompt.push('\n');
    if diverse_links {
        prompt.push_str(&format!(
            "The description field for each link must be informative and specific about the \
relationship between the nodes. Avoid generic or uninformative relationship labels such as \
'relation', 'related to', 'connection', or similar vague terms. Do not use the same relationship \
word or phrase more than {MAX_PHRASE_REPEATS} times in the entire graph, even if it is a good one. \
Use a diverse set of relationship descriptions that are contextually appropriate and meaningful \
for each edge.\n"
        ));
    }
    prompt.push_str(GRAPH_OUTPUT_RULE);
    prompt.push('\n');
    prompt.push_str("Here is the input text: ");
    prompt.push_str(text);
    prompt
}
