use crate::parser::ast::*;
use crate::parser::lexer::*;

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    lookahead: Option<Token>,
}

impl<'a> Parser<'a> {
    pub fn new(src: &'a str) -> Result<Self, ParserError> {
        let mut lexer = Lexer::new(src);
        let lookahead = lexer.next_token()?;

        Ok(Parser { lexer, lookahead })
    }

    fn advance(&mut self) -> Result<Option<Token>, ParserError> {
        let token = self.lookahead.take();
        self.lookahead = self.lexer.next_token()?;
        Ok(token)
    }

    fn expect(&mut self, expected: Token) -> Result<(), ParserError> {
        match self.advance()? {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(self.unexpected(&token)),
            None => Err(ParserError::UnexpectedEOF),
        }
    }

    fn unexpected(&self, token: &Token) -> ParserError {
        ParserError::UnexpectedToken(
            format!("{:?}", token),
            self.lexer.line_num,
            self.lexer.col_num,
        )
    }

    pub fn at_eof(&self) -> bool {
        self.lookahead.is_none()
    }

    fn parse_term(&mut self) -> Result<Term, ParserError> {
        match self.advance()? {
            Some(Token::Var(name)) => Ok(Term::Var(name)),
            Some(Token::Atom(name)) => {
                if self.lookahead == Some(Token::Open) {
                    self.advance()?;

                    let mut args = vec![self.parse_term()?];

                    while self.lookahead == Some(Token::Comma) {
                        self.advance()?;
                        args.push(self.parse_term()?);
                    }

                    self.expect(Token::Close)?;
                    Ok(Term::Compound(name, args))
                } else {
                    Ok(Term::Atom(name))
                }
            }
            Some(token) => Err(self.unexpected(&token)),
            None => Err(ParserError::UnexpectedEOF),
        }
    }

    fn parse_callable(&mut self) -> Result<Term, ParserError> {
        let (line, col) = (self.lexer.line_num, self.lexer.col_num);
        let term = self.parse_term()?;

        if term.is_callable() {
            Ok(term)
        } else {
            Err(ParserError::NonCallableHead(line, col))
        }
    }

    fn parse_goals(&mut self) -> Result<Vec<Term>, ParserError> {
        let mut goals = vec![self.parse_callable()?];

        while self.lookahead == Some(Token::Comma) {
            self.advance()?;
            goals.push(self.parse_callable()?);
        }

        Ok(goals)
    }

    /// Parses one clause: `head.` or `head :- g1, ..., gn.`
    pub fn parse_clause(&mut self) -> Result<Clause, ParserError> {
        let head = self.parse_callable()?;

        let body = match self.advance()? {
            Some(Token::End) => return Ok(Clause { head, body: vec![] }),
            Some(Token::If) => self.parse_goals()?,
            Some(token) => return Err(self.unexpected(&token)),
            None => return Err(ParserError::UnexpectedEOF),
        };

        self.expect(Token::End)?;
        Ok(Clause { head, body })
    }

    /// Parses a query: `g1, ..., gn.` with an optional leading `?-`.
    pub fn parse_query(&mut self) -> Result<Vec<Term>, ParserError> {
        if self.lookahead == Some(Token::Query) {
            self.advance()?;
        }

        let goals = self.parse_goals()?;
        self.expect(Token::End)?;

        Ok(goals)
    }
}

/// Parses a whole program text into clauses.
pub fn parse_program(src: &str) -> Result<Vec<Clause>, ParserError> {
    let mut parser = Parser::new(src)?;
    let mut clauses = Vec::new();

    while !parser.at_eof() {
        clauses.push(parser.parse_clause()?);
    }

    Ok(clauses)
}

/// Parses a single query line.
pub fn parse_query(src: &str) -> Result<Vec<Term>, ParserError> {
    let mut parser = Parser::new(src)?;
    let goals = parser.parse_query()?;

    if parser.at_eof() {
        Ok(goals)
    } else {
        Err(ParserError::UnexpectedToken(
            "trailing input".to_string(),
            parser.lexer.line_num,
            parser.lexer.col_num,
        ))
    }
}
