pub const POLISH_SYSTEM: &str = "You are an expert at writing job application emails. \
    Write personalized, specific content that sounds like a real person. \
    Respond with valid JSON only.";

pub const POLISH_PROMPT: &str = r#"Write personalized paragraphs for a job application email.

JOB:
Title: {title}
Company: {company}
Description: {description}

RECIPIENT: {contact_name}{contact_title}

CANDIDATE:
Name: {candidate_name}
Summary: {summary}
Most recent role: {recent_role}
Skills to emphasize: {skills}
Customization notes: {notes}

TONE: {template}

{truthfulness}

Each paragraph is 1-3 sentences and must not repeat the greeting, sign-off or job title sentence.
Return a JSON object:
{
  "personalized_introduction": "why this company and role, specific to the posting",
  "experience_highlight": "the most relevant experience",
  "skills_alignment": "how the candidate's skills match the requirements",
  "key_technologies": "2-3 technologies, comma separated",
  "problem_solving_example": "one concrete achievement relevant to the role"
}"#;
