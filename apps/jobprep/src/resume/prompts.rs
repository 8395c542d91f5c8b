pub const RESUME_SYSTEM: &str = "You are an expert technical recruiter and resume writer. \
    You tailor resumes to a specific job without changing the facts. \
    Respond with valid JSON only.";

pub const ANALYSIS_PROMPT: &str = r#"Analyze how this candidate matches the job and plan a resume customization.

JOB:
Title: {title}
Company: {company}
Experience Level: {experience_level}
Description:
{description}

CANDIDATE RESUME (experience entries are numbered):
{resume}

Return a JSON object:
{
  "key_skills_to_emphasize": ["skills from the candidate's resume that matter most for this job, most important first"],
  "experience_to_highlight": [index numbers of the most relevant experience entries],
  "summary_focus": "what the summary should stress for this role",
  "strategy": "one or two sentences on the overall approach",
  "gaps": ["job requirements the resume does not show"],
  "confidence": number between 0 and 1
}"#;

pub const REWRITE_PROMPT: &str = r#"Rewrite parts of this resume for the job below, following the plan.

JOB: {title} at {company}
Description:
{description}

PLAN:
Emphasize skills: {skills}
Highlight experience entries: {highlights}
Summary focus: {summary_focus}
Strategy: {strategy}

CANDIDATE RESUME (experience entries are numbered):
{resume}

{truthfulness}

Return a JSON object:
{
  "summary": "rewritten professional summary, 2-4 sentences",
  "experience": [
    { "index": entry number, "bullets": ["rewritten bullet", "..."] }
  ]
}
Only include experience entries you changed. Keep each entry's bullet count within one of the original."#;
