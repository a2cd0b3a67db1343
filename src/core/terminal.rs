use console::{Emoji, style};

static CHECK: Emoji<'_, '_> = Emoji("✔ ", "");
static DOT: Emoji<'_, '_> = Emoji("∙ ", "- ");

pub fn print_success(msg: &str) {
    println!("{}{}", style(CHECK).green(), style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{}{}", DOT, msg);
}

pub fn print_warn(msg: &str) {
    println!("{}{}", style("warning: ").yellow().bold(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{}{}", style("error: ").red().bold(), msg);
}

/// Labelled progress line, e.g. `Submitting: jenkins migration from ci.groovy`.
pub fn print_status(label: &str, msg: &str) {
    println!("{}{} {}", DOT, style(format!("{}:", label)).bold().cyan(), msg);
}

pub fn print_banner() {
    println!();
    println!(
        "{} {}",
        style("pipeshift").bold().cyan(),
        style("— migrate CI/CD configs into pipelines").dim()
    );
    println!();
}

/// A titled block of commands for help output.
pub struct GuideSection {
    title: &'static str,
    commands: Vec<(&'static str, &'static str)>,
}

impl GuideSection {
    pub fn new(title: &'static str) -> Self {
        Self {
            title,
            commands: Vec::new(),
        }
    }

    pub fn command(mut self, name: &'static str, description: &'static str) -> Self {
        self.commands.push((name, description));
        self
    }

    pub fn print(self) {
        println!(" {}", style(self.title).bold().underlined());
        for (name, description) in self.commands {
            println!("   {:<12} {}", style(name).green(), description);
        }
        println!();
    }
}
