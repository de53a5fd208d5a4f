//! Turns submitted text into a self-contained Go program.
//!
//! Classification and wrapping are separate pure steps: [`classify`] decides
//! what the submission looks like, [`prepare_source`] applies the matching
//! transform. Neither step can fail.

const PACKAGE_CLAUSE: &str = "package main\n\n";

/// Imports available to wrapped submissions
const PRELUDE: &str = "package main

import (
\t\"bufio\"
\t\"fmt\"
\t\"os\"
\t\"strconv\"
\t\"strings\"
)
";

/// Keeps the compiler from rejecting prelude imports the submission does not
/// use. Goes last so imports in the submission still precede every other
/// declaration.
const BLANK_USES: &str = "
var (
\t_ = bufio.NewScanner
\t_ = fmt.Println
\t_ = os.Stdin
\t_ = strconv.Itoa
\t_ = strings.TrimSpace
)
";

/// Entry point generated for submissions that only define functions. It echoes
/// the first line of standard input and does not call the submitted code.
const ECHO_MAIN: &str = "func main() {
\tscanner := bufio.NewScanner(os.Stdin)
\tif scanner.Scan() {
\t\tfmt.Println(scanner.Text())
\t}
}
";

/// Shape of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceShape {
    /// Defines `func main()`; may or may not declare `package main`
    EntryPoint { declares_package: bool },
    /// Defines functions but no entry point
    NamedFunctionOnly,
    /// Plain statements meant to be the body of `main`
    BareStatements,
}

pub fn classify(source: &str) -> SourceShape {
    let mut has_main = false;
    let mut has_func = false;
    let mut declares_package = false;

    // Statements may share a line when separated by semicolons
    for line in source.split(['\n', ';']).map(str::trim_start) {
        if line.starts_with("func main()") {
            has_main = true;
        }
        if line.starts_with("func ") {
            has_func = true;
        }
        let mut tokens = line.split_whitespace();
        if tokens.next() == Some("package") && tokens.next() == Some("main") {
            declares_package = true;
        }
    }

    if has_main {
        SourceShape::EntryPoint { declares_package }
    } else if has_func {
        SourceShape::NamedFunctionOnly
    } else {
        SourceShape::BareStatements
    }
}

/// Returns the program that is handed to the toolchain
pub fn prepare_source(source: &str) -> String {
    match classify(source) {
        SourceShape::EntryPoint {
            declares_package: true,
        } => source.to_string(),
        SourceShape::EntryPoint {
            declares_package: false,
        } => format!("{PACKAGE_CLAUSE}{source}"),
        SourceShape::NamedFunctionOnly => {
            let mut program = String::from(PRELUDE);
            program.push('\n');
            program.push_str(source);
            if !source.ends_with('\n') {
                program.push('\n');
            }
            program.push('\n');
            program.push_str(ECHO_MAIN);
            program.push_str(BLANK_USES);
            program
        }
        SourceShape::BareStatements => {
            let mut program = String::from(PRELUDE);
            program.push_str("\nfunc main() {\n");
            program.push_str(source);
            if !source.ends_with('\n') {
                program.push('\n');
            }
            program.push_str("}\n");
            program.push_str(BLANK_USES);
            program
        }
    }
}
