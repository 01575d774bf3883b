// ATS scoring prompt templates.

pub const ATS_SYSTEM: &str = "\
You are an Applicant Tracking System (ATS) compatibility reviewer. \
You score resumes against a target job type and give concrete, actionable advice. \
You MUST respond with valid JSON only — no markdown fences, no explanations.";

pub const ATS_PROMPT: &str = r#"Analyze the following resume text against the job type "{job_type}" to determine an ATS (Applicant Tracking System) compatibility score out of 100.
Provide actionable suggestions to improve the resume's ATS score for this specific job type.
Focus on keywords, formatting that might hinder ATS parsing, and overall relevance.

RESUME TEXT:
{resume_text}

OUTPUT SCHEMA (return exactly this structure):
{
  "score": integer between 0 and 100,
  "suggestions": ["string", ...]
}"#;

pub fn build_ats_prompt(resume_text: &str, job_type: &str) -> String {
    ATS_PROMPT
        .replace("{job_type}", job_type)
        .replace("{resume_text}", resume_text)
}
