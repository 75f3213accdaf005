/// Available operations and name resolution

/// What an operation hands back to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
  /// `{ok, items, hasMore, error?}`, served through the cache
  Envelope,
  /// Flat `{ok, ...fields, error?}`
  Record,
}

#[derive(Debug, Clone)]
pub struct Operation {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
  pub result: ResultKind,
}

/// All available operations
pub const OPERATIONS: &[Operation] = &[
  Operation {
    name: "health",
    aliases: &["ping"],
    description: "Probe upstream reachability and status",
    result: ResultKind::Record,
  },
  Operation {
    name: "list_entities",
    aliases: &["list"],
    description: "List methods, classes, segments, imports, exports, data or namespaces",
    result: ResultKind::Envelope,
  },
  Operation {
    name: "list_data",
    aliases: &["data"],
    description: "List defined data items with optional name and type filters",
    result: ResultKind::Envelope,
  },
  Operation {
    name: "search_functions",
    aliases: &["search"],
    description: "Search functions whose name contains a substring",
    result: ResultKind::Envelope,
  },
  Operation {
    name: "get_data_item",
    aliases: &["data_item"],
    description: "Details of one data item by name or address",
    result: ResultKind::Record,
  },
  Operation {
    name: "read_memory",
    aliases: &["memory", "read"],
    description: "Read up to 4096 bytes at an address",
    result: ResultKind::Record,
  },
  Operation {
    name: "search_data_references",
    aliases: &["refs", "references"],
    description: "Find references to an address or byte pattern",
    result: ResultKind::Record,
  },
  Operation {
    name: "decompile_function",
    aliases: &["decompile"],
    description: "Decompile a function by exact name",
    result: ResultKind::Record,
  },
  Operation {
    name: "get_function_callers",
    aliases: &["callers"],
    description: "Functions that call the given function",
    result: ResultKind::Record,
  },
  Operation {
    name: "overview",
    aliases: &[],
    description: "Overview of the loaded binary",
    result: ResultKind::Record,
  },
  Operation {
    name: "get_binary_status",
    aliases: &["status", "binary"],
    description: "Current binary status and basic information",
    result: ResultKind::Record,
  },
  Operation {
    name: "rename_function",
    aliases: &[],
    description: "Rename a function",
    result: ResultKind::Record,
  },
  Operation {
    name: "rename_data",
    aliases: &[],
    description: "Rename the data label at an address",
    result: ResultKind::Record,
  },
  Operation {
    name: "load_binary",
    aliases: &["load"],
    description: "Load a binary file into the analysis engine",
    result: ResultKind::Record,
  },
];

/// Resolve an exact name or alias
pub fn find(name: &str) -> Option<&'static Operation> {
  OPERATIONS
    .iter()
    .find(|op| op.name == name || op.aliases.contains(&name))
}

/// Get suggestions for a possibly misspelled operation name
pub fn get_suggestions(input: &str) -> Vec<&'static Operation> {
  let input_lower = input.to_lowercase();

  if input_lower.is_empty() {
    return OPERATIONS.iter().collect();
  }

  let mut matches: Vec<(&Operation, u32)> = Vec::new();

  for op in OPERATIONS {
    // Exact match on name
    if op.name == input_lower {
      matches.push((op, 0));
      continue;
    }

    // Exact match on alias
    if op.aliases.contains(&input_lower.as_str()) {
      matches.push((op, 1));
      continue;
    }

    // Prefix match on name
    if op.name.starts_with(&input_lower) {
      matches.push((op, 2));
      continue;
    }

    // Fuzzy match (contains)
    if op.name.contains(&input_lower) {
      matches.push((op, 3));
      continue;
    }

    // Fuzzy match on alias
    if op.aliases.iter().any(|a| a.contains(&input_lower)) {
      matches.push((op, 4));
    }
  }

  matches.sort_by_key(|(_, priority)| *priority);

  matches.into_iter().map(|(op, _)| op).collect()
}
