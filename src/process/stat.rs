//! Parser for the `/proc/<pid>/stat` line.
//!
//! The second field is the command name wrapped in parentheses, and the name
//! itself may contain spaces and parentheses (`1234 (my (weird) app) S ...`).
//! The name is therefore bounded by the first `(` and the last `)`, and only
//! the text after the last `)` is split on whitespace.

/// Scheduling state of a process (stat field 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessState {
    /// `R`
    Running,
    /// `S`, interruptible sleep.
    Sleeping,
    /// `D`, uninterruptible (usually disk) sleep. Never folded into Sleeping.
    DiskSleep,
    /// `I`, idle kernel thread.
    Idle,
    /// `Z`
    Zombie,
    /// `T` (job control) and `t` (tracing) stops.
    Stopped,
    Other(char),
}

impl ProcessState {
    pub fn from_char(c: char) -> Self {
        match c {
            'R' => ProcessState::Running,
            'S' => ProcessState::Sleeping,
            'D' => ProcessState::DiskSleep,
            'I' => ProcessState::Idle,
            'Z' => ProcessState::Zombie,
            'T' | 't' => ProcessState::Stopped,
            other => ProcessState::Other(other),
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            ProcessState::Running => 'R',
            ProcessState::Sleeping => 'S',
            ProcessState::DiskSleep => 'D',
            ProcessState::Idle => 'I',
            ProcessState::Zombie => 'Z',
            ProcessState::Stopped => 'T',
            ProcessState::Other(c) => *c,
        }
    }
}

/// Fields of interest from one stat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatLine {
    pub pid: u32,
    pub comm: String,
    pub state: ProcessState,
    pub ppid: u32,
    /// User-mode ticks (field 14).
    pub utime: u64,
    /// Kernel-mode ticks (field 15).
    pub stime: u64,
    /// Start time in ticks since boot (field 22).
    pub start_time: u64,
    /// Virtual memory size in bytes (field 23).
    pub vsize: u64,
    /// Resident set size in pages (field 24).
    pub rss_pages: u64,
}

// Offsets into the whitespace-split remainder after the closing `)`.
// Kernel field N (1-indexed) lands at index N - 3.
const IDX_STATE: usize = 0;
const IDX_PPID: usize = 1;
const IDX_UTIME: usize = 11;
const IDX_STIME: usize = 12;
const IDX_STARTTIME: usize = 19;
const IDX_VSIZE: usize = 20;
const IDX_RSS: usize = 21;

/// Parses a stat line. Returns a human-readable reason on malformed input.
pub fn parse_stat_line(line: &str) -> Result<StatLine, String> {
    let open = line.find('(').ok_or("missing '('")?;
    let close = line.rfind(')').ok_or("missing ')'")?;
    if close < open {
        return Err("')' precedes '('".into());
    }

    let pid: u32 = line[..open]
        .trim()
        .parse()
        .map_err(|_| format!("invalid pid '{}'", line[..open].trim()))?;
    let comm = line[open + 1..close].to_string();

    let rest: Vec<&str> = line[close + 1..].split_whitespace().collect();
    if rest.len() <= IDX_RSS {
        return Err(format!(
            "expected at least {} fields after comm, got {}",
            IDX_RSS + 1,
            rest.len()
        ));
    }

    let state_char = rest[IDX_STATE]
        .chars()
        .next()
        .ok_or("empty state field")?;

    let num = |idx: usize, name: &str| -> Result<u64, String> {
        rest[idx]
            .parse::<u64>()
            .map_err(|_| format!("invalid {} '{}'", name, rest[idx]))
    };

    Ok(StatLine {
        pid,
        comm,
        state: ProcessState::from_char(state_char),
        ppid: num(IDX_PPID, "ppid")? as u32,
        utime: num(IDX_UTIME, "utime")?,
        stime: num(IDX_STIME, "stime")?,
        start_time: num(IDX_STARTTIME, "starttime")?,
        vsize: num(IDX_VSIZE, "vsize")?,
        rss_pages: num(IDX_RSS, "rss")?,
    })
}
