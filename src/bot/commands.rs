//! Prefix command parsing.

/// A chat command addressed to the bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Play now if idle, otherwise queue
    Play(String),
    /// Append without attempting playback
    Queue(String),
    Skip,
    Stop,
    ClearQueue,
    Pause,
    Resume,
    /// Known command missing its argument
    Usage(&'static str),
}

impl Command {
    /// Parses `content` if it starts with `prefix` and names a known command.
    pub fn parse(content: &str, prefix: &str) -> Option<Self> {
        let body = content.trim().strip_prefix(prefix)?;
        let (name, argument) = match body.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (body, ""),
        };

        let command = match name.to_lowercase().as_str() {
            "play" if argument.is_empty() => Command::Usage("play"),
            "play" => Command::Play(argument.to_string()),
            "queue" if argument.is_empty() => Command::Usage("queue"),
            "queue" => Command::Queue(argument.to_string()),
            "skip" => Command::Skip,
            "stop" => Command::Stop,
            "clearqueue" => Command::ClearQueue,
            "pause" => Command::Pause,
            "resume" => Command::Resume,
            _ => return None,
        };

        Some(command)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Play(_) => "play",
            Command::Queue(_) => "queue",
            Command::Skip => "skip",
            Command::Stop => "stop",
            Command::ClearQueue => "clearqueue",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Usage(name) => name,
        }
    }
}

/// Help line for a command that requires a request argument
pub fn usage(prefix: &str, command: &str) -> String {
    format!("ℹ️ Usage: `{}{} <link or search terms>`", prefix, command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_play_keeps_the_whole_request() {
        assert_eq!(
            Command::parse(".play daft punk  one more time ", "."),
            Some(Command::Play("daft punk  one more time".into()))
        );
        assert_eq!(
            Command::parse(".PLAY https://youtu.be/abc", "."),
            Some(Command::Play("https://youtu.be/abc".into()))
        );
    }

    #[test]
    fn test_argument_free_commands() {
        assert_eq!(Command::parse(".skip", "."), Some(Command::Skip));
        assert_eq!(Command::parse(".stop", "."), Some(Command::Stop));
        assert_eq!(Command::parse(".clearqueue", "."), Some(Command::ClearQueue));
        assert_eq!(Command::parse(".pause", "."), Some(Command::Pause));
        assert_eq!(Command::parse("!resume", "!"), Some(Command::Resume));
    }

    #[test]
    fn test_missing_request_yields_usage() {
        assert_eq!(Command::parse(".play", "."), Some(Command::Usage("play")));
        assert_eq!(Command::parse(".queue   ", "."), Some(Command::Usage("queue")));
        assert_eq!(usage(".", "play"), "ℹ️ Usage: `.play <link or search terms>`");
    }

    #[test]
    fn test_other_messages_are_ignored() {
        assert_eq!(Command::parse("play something", "."), None);
        assert_eq!(Command::parse(".dance", "."), None);
        assert_eq!(Command::parse(".", "."), None);
    }
}
