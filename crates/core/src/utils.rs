use uuid::Uuid;

pub fn generate_schema_name() -> String {
    let uuid_str = Uuid::new_v4().to_string().replace('-', "_");
    format!("tenant_{}", &uuid_str[..8])
}

pub fn validate_email(email: &str) -> bool {
    use regex::Regex;
    
    let email_regex = Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();
    email_regex.is_match(email)
}

pub fn sanitize_string(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || "-_.@".contains(*c))
        .collect()
}