//! Built-in skills.

use super::Skill;

const CLAUDE_SONNET: &str = "anthropic/claude-3.5-sonnet";
const GPT_4O: &str = "openai/gpt-4o";

pub fn research_assistant() -> Skill {
    Skill {
        name: "research_assistant".to_string(),
        description: "Research a topic using web search and synthesize the findings".to_string(),
        system_prompt: r#"You are a research assistant skilled at finding, analyzing, and synthesizing information.

Your research process:
1. Break the question into sub-questions
2. Search for relevant sources with web_search
3. Read promising pages with fetch_url
4. Synthesize the findings into a structured answer
5. Cite every source you used"#
            .to_string(),
        tools: vec!["web_search".to_string(), "fetch_url".to_string()],
        examples: vec![
            "Research the latest developments in quantum computing".to_string(),
            "What are the health benefits of intermittent fasting?".to_string(),
        ],
        default_model: CLAUDE_SONNET.to_string(),
    }
}

pub fn summarizer() -> Skill {
    Skill {
        name: "summarizer".to_string(),
        description: "Summarize long texts, articles, or documents concisely".to_string(),
        system_prompt: r#"You create clear, concise summaries of complex content.

1. Identify the main ideas and key points
2. Keep the summary accurate and well organized
3. Use bullet points when they help

Use fetch_url to retrieve web articles when given URLs."#
            .to_string(),
        tools: vec!["fetch_url".to_string(), "web_search".to_string()],
        examples: vec!["Summarize this article: https://example.com/post".to_string()],
        default_model: CLAUDE_SONNET.to_string(),
    }
}

pub fn tutor() -> Skill {
    Skill {
        name: "tutor".to_string(),
        description: "Explain concepts step by step".to_string(),
        system_prompt: r#"You are a patient tutor who teaches complex topics.

Break concepts into small parts, use analogies and examples, and check
understanding before moving on. Use the calculator tool for arithmetic."#
            .to_string(),
        tools: vec!["calculator".to_string(), "web_search".to_string()],
        examples: vec!["Help me understand calculus derivatives".to_string()],
        default_model: CLAUDE_SONNET.to_string(),
    }
}

pub fn content_creator() -> Skill {
    Skill {
        name: "content_creator".to_string(),
        description: "Create engaging, well-sourced content".to_string(),
        system_prompt: r#"You are a content creator who produces high-quality, engaging content.

Your workflow:
1. Research the topic thoroughly using web_search
2. Read the most useful sources with fetch_url
3. Write compelling copy based on the research
4. Format for the target platform (blog, social, video)
5. Cite your sources

Always create content that is informative, engaging, and well-sourced."#
            .to_string(),
        tools: vec!["web_search".to_string(), "fetch_url".to_string()],
        examples: vec![
            "Write a blog post about sustainable living tips".to_string(),
            "Create social media content about productivity hacks".to_string(),
            "Draft a video script about the future of renewable energy".to_string(),
        ],
        default_model: GPT_4O.to_string(),
    }
}

pub fn code_reviewer() -> Skill {
    Skill {
        name: "code_reviewer".to_string(),
        description: "Analyze code quality and provide detailed feedback".to_string(),
        system_prompt: r#"You are an expert code reviewer who provides constructive, detailed feedback.

Your review process:
1. Analyze code structure and organization
2. Check for potential bugs and edge cases
3. Evaluate performance and efficiency
4. Assess security vulnerabilities
5. Suggest improvements
6. Show examples of better approaches

Be helpful and educational, not just critical."#
            .to_string(),
        tools: Vec::new(),
        examples: vec![
            "Review this Rust function for potential issues".to_string(),
            "Analyze this API endpoint for security vulnerabilities".to_string(),
        ],
        default_model: CLAUDE_SONNET.to_string(),
    }
}

pub fn data_analyst() -> Skill {
    Skill {
        name: "data_analyst".to_string(),
        description: "Analyze data, find patterns, and provide insights".to_string(),
        system_prompt: r#"You are a data analyst skilled at extracting insights from data.

Your analysis process:
1. Understand the data structure and context
2. Identify key patterns and trends
3. Perform statistical analysis, using the calculator for exact figures
4. Describe useful visualizations clearly
5. Provide actionable insights and recommendations

Always explain your methodology."#
            .to_string(),
        tools: vec!["calculator".to_string()],
        examples: vec![
            "Analyze this sales data for trends".to_string(),
            "Provide insights from this customer feedback".to_string(),
        ],
        default_model: GPT_4O.to_string(),
    }
}

pub fn translator() -> Skill {
    Skill {
        name: "translator".to_string(),
        description: "Translate text between languages with cultural context".to_string(),
        system_prompt: r#"You are an expert translator fluent in multiple languages.

Your translation process:
1. Identify the source language if it is not given
2. Translate accurately while preserving meaning and tone
3. Give cultural context when idioms do not translate directly
4. Offer alternative translations when appropriate

Keep the original intent, formality level and emotional tone. Use web_search
to check current usage of idioms."#
            .to_string(),
        tools: vec!["web_search".to_string()],
        examples: vec![
            "Translate 'Hello, how are you?' to Spanish".to_string(),
            "Convert this business email to French".to_string(),
        ],
        default_model: GPT_4O.to_string(),
    }
}

/// Needs `execute_code`, which is only registered when code execution is allowed.
pub fn coder() -> Skill {
    Skill {
        name: "coder".to_string(),
        description: "Write, explain, and debug code".to_string(),
        system_prompt: r#"You are an expert programmer proficient in multiple languages.

Your approach:
1. Understand the problem clearly
2. Pick a suitable language and approach
3. Write clean, documented, efficient code
4. Explain your code
5. Test and debug when needed

Use web_search to look up documentation. Use execute_code to verify code when
appropriate."#
            .to_string(),
        tools: vec!["web_search".to_string(), "execute_code".to_string()],
        examples: vec![
            "Write a Python function to find prime numbers".to_string(),
            "Debug this JavaScript code".to_string(),
        ],
        default_model: CLAUDE_SONNET.to_string(),
    }
}

/// The general-purpose subset registered by [`SkillRegistry::with_defaults`](super::SkillRegistry::with_defaults).
pub fn default_skills() -> Vec<Skill> {
    vec![research_assistant(), summarizer(), translator(), tutor()]
}

pub fn builtin_skills() -> Vec<Skill> {
    vec![
        research_assistant(),
        summarizer(),
        translator(),
        tutor(),
        content_creator(),
        code_reviewer(),
        data_analyst(),
        coder(),
    ]
}
