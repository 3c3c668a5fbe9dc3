/// What the operator typed on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    Post(String),
    PostAnonymous(String),
    Quit,
    Unknown(String),
}

impl OperatorCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return None;
        }

        let command = if line == ":q" {
            OperatorCommand::Quit
        } else if let Some(text) = line.strip_prefix(":184 ") {
            OperatorCommand::PostAnonymous(text.to_string())
        } else if let Some(text) = line.strip_prefix('i') {
            OperatorCommand::Post(text.trim_start().to_string())
        } else {
            OperatorCommand::Unknown(line.to_string())
        };

        match command {
            OperatorCommand::Post(text) | OperatorCommand::PostAnonymous(text) if text.is_empty() => {
                Some(OperatorCommand::Unknown(line.to_string()))
            }
            command => Some(command),
        }
    }
}
