pub const FILTER_SYSTEM: &str = "You are an expert job matching analyst. \
    Assess job postings against a candidate's criteria objectively. \
    Weigh skills alignment (required, preferred, excluded), salary compatibility, \
    location and remote preferences, experience level and employment type. \
    Call out red flags. Respond with valid JSON only.";

pub const FILTER_PROMPT: &str = r#"Analyze the following job posting against the candidate's criteria and decide whether the candidate should apply.

JOB POSTING:
Title: {title}
Company: {company}
Location: {location}
Employment Type: {employment_type}
Experience Level: {experience_level}
Salary Range: {salary_range}
Description: {description}

CRITERIA:
Required Skills: {required_skills}
Preferred Skills: {preferred_skills}
Excluded Skills: {excluded_skills}
Salary Range: {salary_bounds}
Preferred Locations: {preferred_locations}
Excluded Locations: {excluded_locations}
Experience Levels: {experience_levels}
Employment Types: {employment_types}
Preferred Companies: {company_preferences}
Include Keywords: {keywords_include}
Remote Preference: {remote_preference}

Return a JSON object with exactly these fields:
{
  "decision": "accept" | "reject" | "maybe",
  "confidence_score": number between 0 and 1,
  "reasoning": "short explanation",
  "matched_criteria": ["criteria the posting satisfies"],
  "concerns": ["red flags or missing requirements"],
  "salary_match": true | false | null,
  "location_match": true | false | null,
  "skills_match_score": number between 0 and 1,
  "overall_score": number between 0 and 1
}"#;
