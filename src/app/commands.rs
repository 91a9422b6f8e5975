use std::fmt;
use std::str::FromStr;

/// One line typed on stdin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Refresh,
    Retry,
    /// Open the login prompt
    ShowLogin,
    Login { username: String, password: String },
    TwoFactor(String),
    CancelLogin,
    Logout,
    Shutdown,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    Empty,
    Unknown(String),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Empty => write!(f, "empty command"),
            CommandError::Unknown(word) => write!(
                f,
                "unknown command '{}' (refresh, retry, login, 2fa, cancel, logout, shutdown, quit)",
                word
            ),
        }
    }
}

impl std::error::Error for CommandError {}

impl FromStr for UserCommand {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match word.to_ascii_lowercase().as_str() {
            "" => Err(CommandError::Empty),
            "refresh" => Ok(UserCommand::Refresh),
            "retry" | "reconnect" => Ok(UserCommand::Retry),
            "login" if rest.is_empty() => Ok(UserCommand::ShowLogin),
            "login" => {
                // Password is everything after the username
                let (username, password) = match rest.split_once(char::is_whitespace) {
                    Some((username, password)) => (username, password.trim()),
                    None => (rest, ""),
                };
                Ok(UserCommand::Login {
                    username: username.to_string(),
                    password: password.to_string(),
                })
            }
            "2fa" => Ok(UserCommand::TwoFactor(rest.to_string())),
            "cancel" => Ok(UserCommand::CancelLogin),
            "logout" => Ok(UserCommand::Logout),
            "shutdown" => Ok(UserCommand::Shutdown),
            "quit" | "exit" => Ok(UserCommand::Quit),
            _ => Err(CommandError::Unknown(word.to_string())),
        }
    }
}
