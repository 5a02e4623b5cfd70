use crate::domain::account::AccountId;
use crate::domain::trade::{OrderType, Side, TradeRequest};
use crate::error::{LedgerError, Result};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum CommandOp {
    Create,
    Deposit,
    Withdraw,
    Delete,
    List,
    Order,
}

/// One raw script row. Which columns are required depends on `op`.
#[derive(Debug, Deserialize, Default)]
pub struct CommandRecord {
    pub op: Option<CommandOp>,
    pub owner: Option<String>,
    pub account: Option<AccountId>,
    pub quote_account: Option<AccountId>,
    pub currency: Option<String>,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub side: Option<Side>,
    pub r#type: Option<OrderType>,
    pub amount: Option<String>,
    pub price: Option<String>,
}

/// A ledger request read from a script.
#[derive(Debug, PartialEq, Clone)]
pub enum LedgerCommand {
    Create {
        owner: String,
        currency: String,
        name: String,
    },
    Deposit {
        account: AccountId,
        amount: String,
    },
    Withdraw {
        account: AccountId,
        amount: String,
    },
    Delete {
        account: AccountId,
    },
    List {
        owner: String,
    },
    Order(TradeRequest),
}

fn required<T>(value: Option<T>, column: &str, op: CommandOp) -> Result<T> {
    value.ok_or_else(|| {
        LedgerError::Validation(format!("column `{column}` is required for {op:?}"))
    })
}

impl TryFrom<CommandRecord> for LedgerCommand {
    type Error = LedgerError;

    fn try_from(record: CommandRecord) -> Result<Self> {
        let op = record
            .op
            .ok_or_else(|| LedgerError::Validation("column `op` is required".to_string()))?;

        let command = match op {
            CommandOp::Create => LedgerCommand::Create {
                owner: required(record.owner, "owner", op)?,
                currency: required(record.currency, "currency", op)?,
                name: record.name.unwrap_or_default(),
            },
            CommandOp::Deposit => LedgerCommand::Deposit {
                account: required(record.account, "account", op)?,
                amount: required(record.amount, "amount", op)?,
            },
            CommandOp::Withdraw => LedgerCommand::Withdraw {
                account: required(record.account, "account", op)?,
                amount: required(record.amount, "amount", op)?,
            },
            CommandOp::Delete => LedgerCommand::Delete {
                account: required(record.account, "account", op)?,
            },
            CommandOp::List => LedgerCommand::List {
                owner: required(record.owner, "owner", op)?,
            },
            CommandOp::Order => LedgerCommand::Order(TradeRequest {
                base_account: required(record.account, "account", op)?,
                quote_account: required(record.quote_account, "quote_account", op)?,
                symbol: required(record.symbol, "symbol", op)?,
                side: required(record.side, "side", op)?,
                r#type: required(record.r#type, "type", op)?,
                quantity: required(record.amount, "amount", op)?,
                price: record.price,
            }),
        };
        Ok(command)
    }
}

/// Reads ledger commands from a CSV source.
///
/// Fields are trimmed and rows may omit trailing columns their op does not need.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily decodes each row. A malformed row yields an error and reading goes on.
    pub fn commands(self) -> impl Iterator<Item = Result<LedgerCommand>> {
        self.reader.into_deserialize::<CommandRecord>().map(|row| {
            row.map_err(LedgerError::from)
                .and_then(LedgerCommand::try_from)
        })
    }
}
