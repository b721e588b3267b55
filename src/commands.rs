/// Available commands and autocomplete logic

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "tickets",
    aliases: &["t", "ticket", "all"],
    description: "Ticket queue for your role",
  },
  Command {
    name: "mine",
    aliases: &["m", "my"],
    description: "Tickets you created or were assigned",
  },
  Command {
    name: "notifications",
    aliases: &["n", "notif", "inbox"],
    description: "Your notifications",
  },
  Command {
    name: "new",
    aliases: &["create"],
    description: "Open a new ticket",
  },
  Command {
    name: "logout",
    aliases: &["signout", "sign-out"],
    description: "Sign out and exit",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    description: "Exit ticketdesk",
  },
];

/// Get autocomplete suggestions for a given input
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input_lower = input.trim().to_lowercase();

  if input_lower.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&Command, u32)> = COMMANDS
    .iter()
    .filter_map(|cmd| match_rank(cmd, &input_lower).map(|rank| (cmd, rank)))
    .collect();

  // Stable sort keeps table order within a rank
  matches.sort_by_key(|(_, rank)| *rank);
  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

/// Lower is better; `None` when the command does not match at all.
fn match_rank(cmd: &Command, input: &str) -> Option<u32> {
  if cmd.name == input {
    Some(0)
  } else if cmd.aliases.contains(&input) {
    Some(1)
  } else if cmd.name.starts_with(input) {
    Some(2)
  } else if cmd.aliases.iter().any(|a| a.starts_with(input)) {
    Some(3)
  } else if cmd.name.contains(input) {
    Some(4)
  } else if cmd.aliases.iter().any(|a| a.contains(input)) {
    Some(5)
  } else {
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_input_returns_all() {
    assert_eq!(get_suggestions("").len(), COMMANDS.len());
  }

  #[test]
  fn test_exact_match() {
    assert_eq!(get_suggestions("notifications")[0].name, "notifications");
  }

  #[test]
  fn test_alias_match() {
    assert_eq!(get_suggestions("n")[0].name, "notifications");
    assert_eq!(get_suggestions("q")[0].name, "quit");
  }

  #[test]
  fn test_prefix_match() {
    assert_eq!(get_suggestions("tick")[0].name, "tickets");
    assert_eq!(get_suggestions("log")[0].name, "logout");
  }

  #[test]
  fn test_fuzzy_match() {
    assert_eq!(get_suggestions("ifica")[0].name, "notifications");
  }

  #[test]
  fn test_no_match() {
    assert!(get_suggestions("zzz").is_empty());
  }
}
