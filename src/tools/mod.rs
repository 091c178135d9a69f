pub mod assistant;
pub mod terminal;

/// Shared parameter checks, run before a handler touches the session layer.
/// Failures map to `InvalidParams` at the dispatch boundary.
pub fn validate_prompt(prompt: &str) -> Result<(), String> {
    if prompt.trim().is_empty() {
        return Err("prompt must not be empty".to_string());
    }
    Ok(())
}

pub fn validate_command(command: &str) -> Result<(), String> {
    if command.trim().is_empty() {
        return Err("command must not be empty".to_string());
    }
    Ok(())
}
